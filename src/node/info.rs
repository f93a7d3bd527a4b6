use crate::common::{Contact, Id};

use super::Node;

/// Information and statistics about this Kademlia node.
#[derive(Debug, Clone)]
pub struct Info {
    contact: Contact,
    join_number: u64,
    received_find_node: u64,
    routing_table_size: usize,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        self.contact.id()
    }

    /// This Node's own [Contact].
    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    /// Order in which this node joined its network, see [Node::with_join_number].
    pub fn join_number(&self) -> u64 {
        self.join_number
    }

    /// Number of FIND_NODE requests this node answered so far.
    pub fn received_find_node(&self) -> u64 {
        self.received_find_node
    }

    /// Number of contacts in this node's routing table.
    pub fn routing_table_size(&self) -> usize {
        self.routing_table_size
    }
}

impl From<&Node> for Info {
    fn from(node: &Node) -> Self {
        Self {
            contact: node.contact().clone(),
            join_number: node.join_number(),
            received_find_node: node.received_find_node(),
            routing_table_size: node.routing_table().size(),
        }
    }
}
