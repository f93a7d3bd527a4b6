//! Kademlia node: routing table maintenance, request handling and lookups.

mod config;
mod handle_request;
mod info;
mod lookup;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::common::{Contact, Id, Insertion, Message, MessageKind, RoutingTable, Shortlist};
use crate::transport::Transport;
use crate::Result;

pub use config::{Config, DEFAULT_ALPHA};
pub use info::Info;

#[derive(Debug)]
/// A Kademlia node.
///
/// Owns its routing table, and reaches other nodes through a shared [Transport].
/// All methods take `&self`, so a node can answer requests while one of its own
/// lookups is waiting on the network.
pub struct Node {
    contact: Contact,
    config: Config,
    join_number: u64,
    received_find_node: AtomicU64,
    routing_table: Mutex<RoutingTable>,
    transport: Arc<dyn Transport>,
}

impl Node {
    /// Create a new node with an empty routing table.
    pub fn new(contact: Contact, config: Config, transport: Arc<dyn Transport>) -> Result<Node> {
        config.validate()?;

        Ok(Node {
            routing_table: Mutex::new(RoutingTable::new(contact.id().clone(), config.k)),
            contact,
            config,
            join_number: 0,
            received_find_node: AtomicU64::new(0),
            transport,
        })
    }

    /// Set the order in which this node joined its network.
    pub fn with_join_number(mut self, join_number: u64) -> Self {
        self.join_number = join_number;
        self
    }

    // === Getters ===

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn id(&self) -> &Id {
        self.contact.id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn join_number(&self) -> u64 {
        self.join_number
    }

    /// Number of FIND_NODE requests this node answered so far.
    pub fn received_find_node(&self) -> u64 {
        self.received_find_node.load(Ordering::Relaxed)
    }

    /// A snapshot of this node's routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.table().clone()
    }

    pub fn info(&self) -> Info {
        Info::from(self)
    }

    // === Public Methods ===

    /// Add a contact to the routing table.
    ///
    /// If its bucket is full, the least recently seen contact of that bucket
    /// is pinged: it is kept if it answers, and replaced by `contact` otherwise.
    pub fn add_contact(&self, contact: Contact) {
        // The table must not stay locked while pinging.
        let insertion = self.table().add(contact.clone());

        match insertion {
            Insertion::Added => {
                trace!(?contact, "Added contact");
            }
            Insertion::Ignored => {}
            Insertion::Full(head) if head == contact => {
                self.table().refresh(head);
            }
            Insertion::Full(head) => {
                if self.ping(&head) {
                    debug!(?head, ignored = ?contact, "Kept responsive contact");
                    self.table().refresh(head);
                } else {
                    debug!(evicted = ?head, added = ?contact, "Evicted unresponsive contact");
                    self.table().replace(head.id(), contact);
                }
            }
        }
    }

    /// Up to `k` known contacts closest to `target`, sorted by distance.
    ///
    /// Includes this node itself if `target` is its own id.
    pub fn find_node(&self, target: &Id) -> Shortlist {
        let mut closest = Shortlist::new(target.clone(), self.config.k);

        if target == self.id() {
            closest.add(self.contact.clone());
        }

        self.table().extend_closest(&mut closest);

        closest
    }

    /// Returns `true` if `contact` answered a ping.
    pub fn ping(&self, contact: &Contact) -> bool {
        let request = Message::ping(self.contact.clone(), contact.clone());

        match self.transport.send_and_receive(request) {
            Some(reply) if reply.sender() == contact => {
                if let MessageKind::Pong = reply.kind() {
                    true
                } else {
                    debug!(?contact, ?reply, "Unexpected reply to ping");
                    false
                }
            }
            Some(reply) => {
                debug!(?contact, ?reply, "Ping answered by another node");
                false
            }
            None => {
                trace!(?contact, "Ping timed out");
                false
            }
        }
    }

    /// Lookup a random id within the bucket at `index`, to populate it.
    ///
    /// # Panics
    ///
    /// If `index` is not smaller than the identifier bit length.
    pub fn refresh_bucket(&self, index: usize) -> Shortlist {
        let target = self.id().random_in_bucket(index);

        self.lookup(&target)
    }

    // === Private Methods ===

    /// Lock the routing table for a single operation.
    fn table(&self) -> MutexGuard<'_, RoutingTable> {
        self.routing_table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the target and every contact of `shortlist` share our bit length.
    fn same_identifier_space(&self, shortlist: &Shortlist) -> bool {
        let bit_length = self.id().bit_length();

        shortlist.target().bit_length() == bit_length
            && shortlist
                .contacts()
                .all(|contact| contact.id().bit_length() == bit_length)
    }

    fn increment_received_find_node(&self) {
        self.received_find_node.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::RwLock;

    use super::*;

    #[derive(Debug, Default)]
    /// Answers pings from a fixed set of online ids.
    struct PingOnly {
        online: RwLock<HashMap<Id, bool>>,
    }

    impl Transport for PingOnly {
        fn send_and_receive(&self, message: Message) -> Option<Message> {
            let online = self
                .online
                .read()
                .ok()?
                .get(message.receiver().id())
                .copied()
                .unwrap_or(false);

            match message.kind() {
                MessageKind::Ping if online => Some(message.pong()),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    /// Answers every FIND_NODE with the same candidates, whatever the target.
    struct FixedCandidates {
        candidates: Vec<Contact>,
    }

    impl Transport for FixedCandidates {
        fn send_and_receive(&self, message: Message) -> Option<Message> {
            let MessageKind::FindNode { traversed } = message.kind() else {
                return None;
            };

            let mut candidates = Shortlist::new(traversed.target().clone(), traversed.k());
            for contact in &self.candidates {
                candidates.add(contact.clone());
            }

            Some(message.found_nodes(candidates))
        }
    }

    fn contact(value: u64) -> Contact {
        Contact::new(
            Id::from_u64(32, value).unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 1000 + value as u16)),
        )
    }

    fn node(value: u64, k: usize, transport: Arc<dyn Transport>) -> Node {
        Node::new(contact(value), Config { k, alpha: 3 }, transport).unwrap()
    }

    #[test]
    fn invalid_config() {
        let transport = Arc::new(PingOnly::default());

        assert!(Node::new(contact(0), Config { k: 0, alpha: 3 }, transport).is_err());
    }

    #[test]
    fn receive_ping() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        let reply = node.receive(Message::ping(contact(5), contact(0))).unwrap();

        assert!(matches!(reply.kind(), MessageKind::Pong));
        assert_eq!(reply.sender(), &contact(0));
        assert_eq!(reply.receiver(), &contact(5));

        assert!(node.routing_table().contains(contact(5).id()));
    }

    #[test]
    fn unexpected_messages_get_no_reply() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        let pong = Message::ping(contact(0), contact(5)).pong();
        assert!(node.receive(pong).is_none());

        // Addressed to someone else.
        assert!(node.receive(Message::ping(contact(5), contact(6))).is_none());

        // From another identifier space.
        let stranger = Contact::random(64);
        assert!(node.receive(Message::ping(stranger, contact(0))).is_none());

        assert_eq!(node.received_find_node(), 0);
        assert!(node.routing_table().is_empty());
    }

    #[test]
    fn receive_find_node() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        node.add_contact(contact(8));
        node.add_contact(contact(9));

        let mut traversed = Shortlist::new(Id::from_u64(32, 10).unwrap(), 20);
        traversed.add(contact(5));
        traversed.add(contact(0));

        let reply = node
            .receive(Message::find_node(contact(5), contact(0), traversed))
            .unwrap();

        let MessageKind::FoundNodes { candidates } = reply.into_kind() else {
            panic!("expected a found_nodes reply")
        };

        assert_eq!(
            candidates.into_contacts(),
            vec![contact(8), contact(9), contact(5)]
        );
        assert_eq!(node.received_find_node(), 1);
        assert_eq!(node.info().routing_table_size(), 3);
    }

    #[test]
    fn find_node_traversal_from_another_identifier_space() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        let mut traversed = Shortlist::new(Id::from_u64(32, 10).unwrap(), 20);
        traversed.add(contact(5));
        traversed.add(Contact::random(64));

        let request = Message::find_node(contact(5), contact(0), traversed);

        assert!(node.receive(request).is_none());
        assert_eq!(node.received_find_node(), 0);
        assert!(node.routing_table().is_empty());
    }

    #[test]
    fn candidates_from_another_identifier_space_are_ignored() {
        let transport = Arc::new(FixedCandidates {
            candidates: vec![contact(2), Contact::random(64)],
        });
        let node = node(0, 20, transport);

        node.add_contact(contact(1));

        let target = Id::from_u64(32, 3).unwrap();
        let shortlist = node.lookup(&target);

        assert_eq!(shortlist.len(), 1);
        assert_eq!(shortlist.get(0).unwrap().status(), crate::Status::Unreachable);

        let table = node.routing_table();
        assert_eq!(table.size(), 1);
        assert!(table.contains(contact(1).id()));
        assert!(table
            .contacts()
            .all(|contact| contact.id().bit_length() == 32));

        let recursive = node.lookup_recursive(&target);
        assert_eq!(recursive.get(0).unwrap().status(), crate::Status::Unreachable);
    }

    #[test]
    fn find_node_self_first() {
        let node = node(0, 3, Arc::new(PingOnly::default()));

        for value in [1, 2, 3, 1 << 16, 1 << 20] {
            node.add_contact(contact(value));
        }

        let closest = node.find_node(node.id());

        assert_eq!(closest.len(), 3);
        assert_eq!(closest.nearest(), Some(&contact(0)));
        assert!(closest.contains(contact(1 << 16).id()));
    }

    #[test]
    fn responsive_head_is_kept() {
        let transport = Arc::new(PingOnly::default());
        let node = node(0, 2, transport.clone());

        transport.online.write().unwrap().insert(contact(8).id().clone(), true);

        // All in bucket 3.
        node.add_contact(contact(8));
        node.add_contact(contact(9));
        node.add_contact(contact(10));

        let table = node.routing_table();
        let bucket: Vec<_> = table.bucket(3).unwrap().iter().cloned().collect();

        assert_eq!(bucket, vec![contact(9), contact(8)]);
    }

    #[test]
    fn unresponsive_head_is_evicted() {
        let node = node(0, 2, Arc::new(PingOnly::default()));

        node.add_contact(contact(8));
        node.add_contact(contact(9));
        node.add_contact(contact(10));

        let table = node.routing_table();
        let bucket: Vec<_> = table.bucket(3).unwrap().iter().cloned().collect();

        assert_eq!(bucket, vec![contact(9), contact(10)]);
    }

    #[test]
    fn lookup_with_empty_table() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        let shortlist = node.lookup(&Id::random(32));

        assert!(shortlist.is_empty());
        assert!(node.lookup_recursive(&Id::random(32)).is_empty());
        assert!(node.routing_table().is_empty());
    }

    #[test]
    fn lookup_with_offline_peers() {
        let node = node(0, 20, Arc::new(PingOnly::default()));

        node.add_contact(contact(1));
        node.add_contact(contact(2));

        let shortlist = node.lookup(&Id::from_u64(32, 3).unwrap());

        assert_eq!(shortlist.len(), 2);
        assert!(shortlist
            .iter()
            .all(|element| element.status() == crate::Status::Unreachable));
    }
}
