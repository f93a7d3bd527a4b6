//! Kademlia routing table

use std::fmt::{self, Debug, Formatter};

use crate::common::{Contact, Id, Insertion, KBucket, Shortlist};

#[derive(Clone)]
/// Kademlia routing table.
///
/// Holds one lazily allocated [KBucket] per bit of the identifier space, where
/// the bucket at index `i` holds contacts whose highest differing bit from
/// this table's [Id] is bit `i`.
pub struct RoutingTable {
    id: Id,
    k: usize,
    buckets: Vec<Option<KBucket>>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id and bucket size.
    pub fn new(id: Id, k: usize) -> Self {
        let slots = id.bit_length() as usize;

        RoutingTable {
            id,
            k,
            buckets: vec![None; slots],
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Maximum size of each bucket.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of bucket slots, equal to the identifier bit length.
    pub fn slots(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket at `index`, if it was ever allocated.
    pub fn bucket(&self, index: usize) -> Option<&KBucket> {
        self.buckets.get(index).and_then(Option::as_ref)
    }

    /// Returns the allocated buckets and their indices.
    pub fn buckets(&self) -> impl Iterator<Item = (usize, &KBucket)> {
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(index, bucket)| bucket.as_ref().map(|bucket| (index, bucket)))
    }

    // === Public Methods ===

    /// Offer a contact to the bucket it belongs to.
    ///
    /// See [KBucket::add]; adding this table's own id is [Insertion::Ignored].
    pub fn add(&mut self, contact: Contact) -> Insertion {
        match self.bucket_mut(contact.id()) {
            Some(bucket) => bucket.add(contact),
            None => Insertion::Ignored,
        }
    }

    /// See [KBucket::refresh].
    pub fn refresh(&mut self, contact: Contact) -> bool {
        match self.bucket_mut(contact.id()) {
            Some(bucket) => bucket.refresh(contact),
            None => false,
        }
    }

    /// See [KBucket::replace].
    pub fn replace(&mut self, unresponsive: &Id, replacement: Contact) -> bool {
        match self.bucket_mut(replacement.id()) {
            Some(bucket) => bucket.replace(unresponsive, replacement),
            None => false,
        }
    }

    /// Remove a contact from this routing table.
    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let index = self.id.bucket_index(id)?;

        self.buckets
            .get_mut(index)
            .and_then(Option::as_mut)
            .and_then(|bucket| bucket.remove(id))
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.id
            .bucket_index(id)
            .and_then(|index| self.bucket(index))
            .is_some_and(|bucket| bucket.contains(id))
    }

    /// Up to `k` known contacts for `target`, sorted by distance to it.
    pub fn closest(&self, target: &Id) -> Shortlist {
        let mut closest = Shortlist::new(target.clone(), self.k);
        self.extend_closest(&mut closest);

        closest
    }

    /// Fill `closest` up to its capacity, then sort it.
    ///
    /// Buckets are walked starting from the bucket the target falls into (or the
    /// middle of the table for our own id), up to the last bucket, then down
    /// to the first one.
    pub fn extend_closest(&self, closest: &mut Shortlist) {
        let slots = self.slots();
        let start = self
            .id
            .bucket_index(closest.target())
            .unwrap_or(slots / 2);

        'walk: for index in (start..slots).chain((0..start).rev()) {
            let Some(bucket) = self.bucket(index) else {
                continue;
            };

            for contact in bucket {
                if closest.len() >= closest.k() {
                    break 'walk;
                }

                closest.add(contact.clone());
            }
        }

        closest.sort();
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets().all(|(_, bucket)| bucket.is_empty())
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.buckets().map(|(_, bucket)| bucket.len()).sum()
    }

    /// Returns an iterator over the contacts in this routing table, by bucket index.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.buckets().flat_map(|(_, bucket)| bucket.iter())
    }

    /// Export an owned vector of contacts from this routing table.
    pub fn to_owned_contacts(&self) -> Vec<Contact> {
        self.contacts().cloned().collect()
    }

    // === Private Methods ===

    fn bucket_mut(&mut self, id: &Id) -> Option<&mut KBucket> {
        let index = self.id.bucket_index(id)?;
        let k = self.k;

        self.buckets
            .get_mut(index)
            .map(|slot| slot.get_or_insert_with(|| KBucket::new(k)))
    }
}

impl Debug for RoutingTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RoutingTable{{ id: {}, buckets: {}, size: {} }}",
            self.id,
            self.buckets().count(),
            self.size()
        )
    }
}
