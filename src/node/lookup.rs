//! Iterative and recursive node lookups.

use std::thread;

use tracing::{debug, trace};

use crate::common::{Contact, Id, Message, MessageKind, Shortlist};

use super::Node;

impl Node {
    /// Join a network through a single known node, by looking up our own id.
    ///
    /// Returns the final shortlist of that lookup.
    pub fn bootstrap(&self, entry: Contact) -> Shortlist {
        self.add_contact(entry);

        let target = self.id().clone();
        let closest = self.lookup(&target);

        debug!(
            table_size = self.table().size(),
            closest = closest.len(),
            "Bootstrapped"
        );

        closest
    }

    /// Iterative lookup of the `k` closest nodes to `target`.
    ///
    /// Queries up to `alpha` candidates at a time, until a round fails to find
    /// a closer node, then queries every remaining candidate once. Everything
    /// learned along the way is added to the routing table.
    ///
    /// Returns the final shortlist, where every element is either
    /// [crate::Status::Contacted] or [crate::Status::Unreachable], except for
    /// candidates discovered by the final round.
    pub fn lookup(&self, target: &Id) -> Shortlist {
        let alpha = self.config.alpha;

        let mut shortlist = self.find_node(target);
        shortlist.remove(self.id());

        let mut traversed = Shortlist::new(target.clone(), self.config.k);
        traversed.add(self.contact.clone());

        let mut batch = shortlist.next_batch(alpha);
        let mut rounds = 0;

        while !batch.is_empty() {
            let nearest = shortlist.nearest().cloned();

            self.query_batch(&mut shortlist, &mut traversed, &batch);
            rounds += 1;

            batch = shortlist.next_batch(alpha);

            if shortlist.nearest() == nearest.as_ref() {
                break;
            }
        }

        // Drain: everything left is tried exactly once.
        let remaining = shortlist.next_batch(shortlist.len());
        for batch in remaining.chunks(alpha) {
            self.query_batch(&mut shortlist, &mut traversed, batch);
        }

        debug!(
            ?target,
            rounds,
            drained = remaining.len(),
            visited = traversed.len() - 1,
            candidates = shortlist.len(),
            "Done lookup"
        );

        shortlist
    }

    /// Recursive lookup: keep asking the nearest known node only, for as long
    /// as it knows a strictly nearer one.
    pub fn lookup_recursive(&self, target: &Id) -> Shortlist {
        let mut shortlist = self.find_node(target);
        shortlist.remove(self.id());

        let mut traversed = Shortlist::new(target.clone(), self.config.k);
        traversed.add(self.contact.clone());

        let Some(mut nearest) = shortlist.nearest().cloned() else {
            return shortlist;
        };

        let mut hops = 0;

        loop {
            let Some(candidates) = self.query(&nearest, &traversed) else {
                shortlist.mark_unreachable(nearest.id());
                break;
            };
            hops += 1;

            shortlist.mark_contacted(nearest.id());
            self.table().refresh(nearest.clone());

            let candidates = self.learn(candidates);
            shortlist.merge(&candidates);

            traversed.add(nearest.clone());

            match candidates.nearest() {
                Some(next) if next.distance_to(target) < nearest.distance_to(target) => {
                    nearest = next.clone();
                }
                _ => break,
            }
        }

        debug!(?target, hops, candidates = shortlist.len(), "Done recursive lookup");

        shortlist
    }

    // === Private Methods ===

    /// Query every contact of `batch` concurrently, then merge what they know
    /// into the shortlist and the routing table.
    fn query_batch(&self, shortlist: &mut Shortlist, traversed: &mut Shortlist, batch: &[Contact]) {
        let mut replies = self.fan_out(traversed, batch);
        // Arrival order must not affect the routing table.
        replies.sort_by_cached_key(|(contact, _)| contact.distance_to(shortlist.target()));

        let mut combined = Shortlist::new(shortlist.target().clone(), self.config.k);

        for (contact, reply) in replies {
            match reply {
                Some(candidates) => {
                    shortlist.mark_contacted(contact.id());
                    self.table().refresh(contact.clone());

                    for candidate in candidates.contacts() {
                        combined.add(candidate.clone());
                    }

                    traversed.add(contact);
                }
                None => {
                    shortlist.mark_unreachable(contact.id());
                }
            }
        }

        let combined = self.learn(combined);
        shortlist.merge(&combined);
    }

    /// Drop ourselves from `candidates`, sort them, and add them all to the routing table.
    fn learn(&self, mut candidates: Shortlist) -> Shortlist {
        candidates.remove(self.id());
        candidates.sort();

        for contact in candidates.contacts() {
            self.add_contact(contact.clone());
        }

        candidates
    }

    /// Send a FIND_NODE to each contact of `batch` in parallel, and collect the replies.
    fn fan_out(
        &self,
        traversed: &Shortlist,
        batch: &[Contact],
    ) -> Vec<(Contact, Option<Shortlist>)> {
        let (sender, receiver) = flume::unbounded();

        thread::scope(|scope| {
            for contact in batch {
                let sender = sender.clone();

                scope.spawn(move || {
                    let reply = self.query(contact, traversed);

                    if sender.send((contact.clone(), reply)).is_err() {
                        trace!(?contact, "Dropped FIND_NODE reply");
                    }
                });
            }
        });

        receiver.try_iter().collect()
    }

    /// Send a FIND_NODE to `contact`, returns the candidates it replied with.
    fn query(&self, contact: &Contact, traversed: &Shortlist) -> Option<Shortlist> {
        let request = Message::find_node(self.contact.clone(), contact.clone(), traversed.clone());

        let Some(reply) = self.transport.send_and_receive(request) else {
            trace!(?contact, target = ?traversed.target(), "FIND_NODE timed out");
            return None;
        };

        if reply.sender() != contact {
            debug!(?contact, ?reply, "FIND_NODE answered by another node");
            return None;
        }

        match reply.into_kind() {
            MessageKind::FoundNodes { candidates } if candidates.target() == traversed.target() => {
                if self.same_identifier_space(&candidates) {
                    Some(candidates)
                } else {
                    debug!(?contact, "FIND_NODE candidates from another identifier space");
                    None
                }
            }
            kind => {
                debug!(?contact, ?kind, "Unexpected reply to FIND_NODE");
                None
            }
        }
    }
}
