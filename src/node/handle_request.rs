use tracing::{debug, trace};

use crate::common::{Message, MessageKind};

use super::Node;

impl Node {
    /// Handle an incoming message, and return the reply to send back if any.
    ///
    /// Replies, and messages meant for another node or another identifier
    /// space, get no reply at all.
    pub fn receive(&self, message: Message) -> Option<Message> {
        if message.receiver() != &self.contact {
            debug!(receiver = ?message.receiver(), "Message addressed to another node");
            return None;
        }

        if message.sender().id().bit_length() != self.id().bit_length() {
            debug!(sender = ?message.sender(), "Message from another identifier space");
            return None;
        }

        trace!(?message, "Received message");

        match message.kind() {
            MessageKind::Ping => {
                self.table().refresh(message.sender().clone());

                Some(message.pong())
            }
            MessageKind::FindNode { traversed } => {
                if !self.same_identifier_space(traversed) {
                    debug!(
                        target = ?traversed.target(),
                        "FIND_NODE traversal from another identifier space"
                    );
                    return None;
                }

                self.increment_received_find_node();

                for contact in traversed.contacts() {
                    self.add_contact(contact.clone());
                }

                Some(message.found_nodes(self.find_node(traversed.target())))
            }
            MessageKind::Pong | MessageKind::FoundNodes { .. } => {
                debug!(?message, "Unexpected reply without a request");
                None
            }
        }
    }
}
