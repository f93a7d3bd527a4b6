//! In-process Kademlia networks, for simulations and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use rand::seq::SliceRandom;
use tracing::{debug, info, trace};

use crate::common::{Contact, Id, Message};
use crate::node::{Config, Node};
use crate::transport::Transport;
use crate::{Error, Result};

#[derive(Debug, Default)]
/// A [Transport] delivering messages to nodes of the same process.
///
/// Every request and reply is encoded and decoded on the way, so nodes never
/// share anything but bytes.
pub struct MemoryTransport {
    nodes: RwLock<HashMap<Id, Weak<Node>>>,
    offline: RwLock<HashSet<Id>>,
    delivered: AtomicU64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` reachable.
    pub fn register(&self, node: &Arc<Node>) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.id().clone(), Arc::downgrade(node));
    }

    pub fn unregister(&self, id: &Id) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Simulate a node going offline, or coming back.
    pub fn set_online(&self, id: &Id, online: bool) {
        let mut offline = self.offline.write().unwrap_or_else(PoisonError::into_inner);

        if online {
            offline.remove(id);
        } else {
            offline.insert(id.clone());
        }
    }

    pub fn is_online(&self, id: &Id) -> bool {
        !self
            .offline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Number of requests delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn node(&self, id: &Id) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .and_then(Weak::upgrade)
    }
}

impl Transport for MemoryTransport {
    fn send_and_receive(&self, message: Message) -> Option<Message> {
        let receiver = message.receiver().id();

        if !self.is_online(receiver) {
            trace!(?receiver, "Receiver is offline");
            return None;
        }

        let Some(node) = self.node(receiver) else {
            trace!(?receiver, "Unknown receiver");
            return None;
        };

        let request = over_the_wire(&message)?;
        self.delivered.fetch_add(1, Ordering::Relaxed);

        let reply = node.receive(request)?;

        over_the_wire(&reply)
    }
}

fn over_the_wire(message: &Message) -> Option<Message> {
    match message.to_bytes().and_then(Message::from_bytes) {
        Ok(message) => Some(message),
        Err(error) => {
            debug!(?error, ?message, "Dropped message");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A routing table entry of some node in a [Testnet].
pub struct Edge {
    /// The node owning the routing table.
    pub source: Id,
    /// The contact in that routing table.
    pub target: Id,
    /// Join number of the source node.
    pub join_number: u64,
    /// FIND_NODE requests answered by the source node.
    pub received_find_node: u64,
}

#[derive(Debug)]
/// Kademlia network of nodes sharing a [MemoryTransport].
///
/// Each new node bootstraps through a random node that joined before it.
pub struct Testnet {
    bit_length: u16,
    config: Config,
    lookups: usize,
    transport: Arc<MemoryTransport>,
    nodes: Vec<Arc<Node>>,
    ids: HashSet<Id>,
}

impl Testnet {
    /// Create an empty network.
    pub fn new(bit_length: u16, config: Config) -> Result<Testnet> {
        // Validates the bit length.
        Id::from_u64(bit_length, 0)?;
        config.validate()?;

        Ok(Testnet {
            bit_length,
            config,
            lookups: 0,
            transport: Arc::new(MemoryTransport::new()),
            nodes: Vec::new(),
            ids: HashSet::new(),
        })
    }

    /// Number of random lookups per bucket each node runs right after bootstrapping.
    ///
    /// Defaults to 0.
    pub fn with_lookups(mut self, lookups: usize) -> Self {
        self.lookups = lookups;
        self
    }

    // === Getters ===

    pub fn bit_length(&self) -> u16 {
        self.bit_length
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<MemoryTransport> {
        &self.transport
    }

    /// Nodes in their join order.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: &Id) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // === Public Methods ===

    /// Add `count` nodes with random ids.
    pub fn populate(&mut self, count: usize) -> Result<()> {
        self.check_capacity(self.nodes.len() + count)?;

        for _ in 0..count {
            self.join()?;
        }

        info!(
            nodes = self.nodes.len(),
            delivered = self.transport.delivered(),
            "Populated the network"
        );

        Ok(())
    }

    /// Add a node with a random id unused so far.
    pub fn join(&mut self) -> Result<Arc<Node>> {
        self.check_capacity(self.nodes.len() + 1)?;

        let contact = loop {
            let contact = Contact::random(self.bit_length);

            if !self.ids.contains(contact.id()) {
                break contact;
            }
        };

        self.join_with(contact)
    }

    /// Add a node for `contact`.
    pub fn join_with(&mut self, contact: Contact) -> Result<Arc<Node>> {
        if contact.id().bit_length() != self.bit_length {
            return Err(Error::InvalidBitLength(contact.id().bit_length()));
        }

        if self.ids.contains(contact.id()) {
            return Err(Error::DuplicateId(contact.id().clone()));
        }

        let join_number = self.nodes.len() as u64;
        let transport: Arc<dyn Transport> = self.transport.clone();
        let node = Node::new(contact, self.config, transport)?.with_join_number(join_number);
        let node = Arc::new(node);

        self.transport.register(&node);

        if let Some(entry) = self.nodes.choose(&mut rand::thread_rng()) {
            node.bootstrap(entry.contact().clone());
        }

        for _ in 0..self.lookups {
            for index in 0..self.bit_length as usize {
                node.refresh_bucket(index);
            }
        }

        debug!(
            id = %node.id(),
            join_number,
            table_size = node.routing_table().size(),
            "Node joined"
        );

        self.ids.insert(node.id().clone());
        self.nodes.push(node.clone());

        Ok(node)
    }

    /// Every routing table entry of every node, in join order.
    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .flat_map(|node| {
                let join_number = node.join_number();
                let received_find_node = node.received_find_node();
                let source = node.id().clone();

                node.routing_table()
                    .to_owned_contacts()
                    .into_iter()
                    .map(move |contact| Edge {
                        source: source.clone(),
                        target: contact.id().clone(),
                        join_number,
                        received_find_node,
                    })
            })
            .collect()
    }

    // === Private Methods ===

    fn check_capacity(&self, nodes: usize) -> Result<()> {
        if self.bit_length < usize::BITS as u16 && nodes > 1_usize << self.bit_length {
            return Err(Error::IdSpaceExhausted {
                bit_length: self.bit_length,
                nodes,
            });
        }

        Ok(())
    }
}
