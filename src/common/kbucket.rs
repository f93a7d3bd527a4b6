//! Kbuckets
use std::collections::vec_deque::{IntoIter, Iter};
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};

use crate::common::{Contact, Id};

/// K = the default maximum size of a k-bucket.
pub const DEFAULT_K: usize = 20;

#[derive(Debug, Clone, PartialEq)]
/// Outcome of offering a contact to a [KBucket] or a [crate::RoutingTable].
pub enum Insertion {
    /// The contact was appended, or it was already known and moved to the tail.
    Added,
    /// The contact is the routing table owner, and was not added.
    Ignored,
    /// The bucket is full. The returned least recently seen contact should be
    /// pinged: if it answers, [KBucket::refresh] it, otherwise [KBucket::replace] it.
    Full(Contact),
}

/// Kbuckets are similar to LRU caches that checks and evicts unresponsive nodes,
/// without dropping any responsive nodes in the process.
///
/// The bucket itself never talks to the network, it only decides which contact
/// needs a liveness check.
#[derive(Clone)]
pub struct KBucket {
    /// K (as in k-bucket) is the maximum number of contacts in a k-bucket.
    k: usize,
    /// Contacts in the k-bucket, sorted by the least recently seen.
    contacts: VecDeque<Contact>,
}

impl KBucket {
    pub fn new(k: usize) -> Self {
        KBucket {
            k,
            contacts: VecDeque::with_capacity(k),
        }
    }

    // === Getters ===

    /// Maximum number of contacts in this bucket.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.k
    }

    /// Least recently seen contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.front()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.iter().any(|contact| contact.id() == id)
    }

    /// Iterate from the least recently seen to the most recently seen contact.
    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    // === Public Methods ===

    /// Add a contact, moving it to the tail if it is already known.
    ///
    /// If the bucket is full, the bucket is left untouched and its head is
    /// returned as a liveness check candidate.
    pub fn add(&mut self, incoming: Contact) -> Insertion {
        if let Some(index) = self.position(incoming.id()) {
            self.contacts.remove(index);
            self.contacts.push_back(incoming);

            Insertion::Added
        } else if self.contacts.len() < self.k {
            self.contacts.push_back(incoming);

            Insertion::Added
        } else {
            match self.contacts.front() {
                Some(head) => Insertion::Full(head.clone()),
                // k == 0
                None => Insertion::Ignored,
            }
        }
    }

    /// Mark a contact as just proven alive: move it to the tail, or append it
    /// if it is unknown and there is room left.
    ///
    /// Returns `true` if the contact is in the bucket afterwards.
    pub fn refresh(&mut self, contact: Contact) -> bool {
        if let Some(index) = self.position(contact.id()) {
            self.contacts.remove(index);
        } else if self.is_full() {
            return false;
        }

        self.contacts.push_back(contact);
        true
    }

    /// Drop an unresponsive contact and append its replacement.
    ///
    /// Returns `true` if `replacement` is in the bucket afterwards.
    pub fn replace(&mut self, unresponsive: &Id, replacement: Contact) -> bool {
        self.remove(unresponsive);
        self.refresh(replacement)
    }

    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        self.position(id).and_then(|index| self.contacts.remove(index))
    }

    // === Private Methods ===

    fn position(&self, id: &Id) -> Option<usize> {
        self.contacts.iter().position(|contact| contact.id() == id)
    }
}

impl Default for KBucket {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl Debug for KBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "KBucket{{ k: {}, contacts: {:?} }}", self.k, self.contacts)
    }
}

impl IntoIterator for KBucket {
    type Item = Contact;
    type IntoIter = IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}

impl<'a> IntoIterator for &'a KBucket {
    type Item = &'a Contact;
    type IntoIter = Iter<'a, Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}
