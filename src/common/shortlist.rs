//! Bounded, target sorted set of lookup candidates.

use std::slice::Iter;

use crate::common::{Contact, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a [Shortlist] element stands within a lookup.
///
/// Transitions are one-way: a `Candidate` becomes either `Contacted` or
/// `Unreachable`, and stays so.
pub enum Status {
    /// Not queried yet.
    Candidate,
    /// Answered a query.
    Contacted,
    /// Was queried and did not answer.
    Unreachable,
}

#[derive(Debug, Clone)]
/// A [Shortlist] entry.
pub struct Element {
    contact: Contact,
    status: Status,
}

impl Element {
    fn new(contact: Contact) -> Self {
        Element {
            contact,
            status: Status::Candidate,
        }
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_contacted(&self) -> bool {
        self.status == Status::Contacted
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.contact == other.contact
    }
}

#[derive(Debug, Clone)]
/// Up to `k` contacts, kept in ascending distance to a `target` after each merge.
pub struct Shortlist {
    target: Id,
    k: usize,
    elements: Vec<Element>,
}

impl Shortlist {
    pub fn new(target: Id, k: usize) -> Self {
        Self {
            target,
            k,
            elements: Vec::new(),
        }
    }

    // === Getters ===

    pub fn target(&self) -> &Id {
        &self.target
    }

    /// Maximum number of contacts kept after a [Self::merge].
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The first contact, which is the closest to the target once sorted.
    pub fn nearest(&self) -> Option<&Contact> {
        self.elements.first().map(Element::contact)
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.position(id).is_some()
    }

    pub fn is_contacted(&self, id: &Id) -> bool {
        self.position(id)
            .is_some_and(|index| self.elements[index].is_contacted())
    }

    pub fn iter(&self) -> Iter<'_, Element> {
        self.elements.iter()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.elements.iter().map(Element::contact)
    }

    // === Public Methods ===

    /// Append a contact as a candidate, unless it is already present.
    ///
    /// Returns `true` if it was added.
    pub fn add(&mut self, contact: Contact) -> bool {
        if self.contains(contact.id()) {
            return false;
        }

        self.elements.push(Element::new(contact));
        true
    }

    /// Add every contact of `other`, sort, then keep only the `k` closest.
    pub fn merge(&mut self, other: &Shortlist) {
        for contact in other.contacts() {
            self.add(contact.clone());
        }

        self.sort();
        self.elements.truncate(self.k);
    }

    /// Sort by ascending distance to the target.
    ///
    /// The sort is stable, so equal distances keep their insertion order.
    pub fn sort(&mut self) {
        let target = &self.target;

        self.elements
            .sort_by_cached_key(|element| element.contact.distance_to(target));
    }

    /// Up to `alpha` candidates that were not queried yet, in the current order.
    pub fn next_batch(&self, alpha: usize) -> Vec<Contact> {
        self.elements
            .iter()
            .filter(|element| element.status == Status::Candidate)
            .take(alpha)
            .map(|element| element.contact.clone())
            .collect()
    }

    /// Returns `false` if the contact is unknown or was already queried.
    pub fn mark_contacted(&mut self, id: &Id) -> bool {
        self.transition(id, Status::Contacted)
    }

    /// Returns `false` if the contact is unknown or was already queried.
    pub fn mark_unreachable(&mut self, id: &Id) -> bool {
        self.transition(id, Status::Unreachable)
    }

    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        self.position(id)
            .map(|index| self.elements.remove(index).contact)
    }

    pub fn into_contacts(self) -> Vec<Contact> {
        self.elements
            .into_iter()
            .map(|element| element.contact)
            .collect()
    }

    // === Private Methods ===

    fn position(&self, id: &Id) -> Option<usize> {
        self.elements
            .iter()
            .position(|element| element.contact.id() == id)
    }

    fn transition(&mut self, id: &Id, status: Status) -> bool {
        match self.position(id) {
            Some(index) if self.elements[index].status == Status::Candidate => {
                self.elements[index].status = status;
                true
            }
            _ => false,
        }
    }
}

impl<'a> IntoIterator for &'a Shortlist {
    type Item = &'a Element;
    type IntoIter = Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
