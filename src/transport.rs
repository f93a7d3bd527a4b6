//! Delivery of messages between nodes.

use crate::common::Message;

/// Delivers a [Message] to its receiver and waits for the reply.
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Deliver `message` to [Message::receiver] and return its reply.
    ///
    /// Returns `None` if the receiver is unreachable, does not answer within
    /// this transport's own timeout, or answers with nothing at all.
    ///
    /// Called concurrently from lookups, and possibly while the receiver is
    /// itself waiting on a reply from the sender.
    fn send_and_receive(&self, message: Message) -> Option<Message>;
}
