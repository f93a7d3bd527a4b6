//! Kademlia messages, and their bencoded wire format.
//!
//! Every message has a sender and a receiver, a reply is the request with
//! both swapped.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use serde_bytes::ByteBuf;

use crate::common::{Contact, Id, Shortlist};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Message {
    sender: Contact,
    receiver: Contact,
    kind: MessageKind,
}

#[derive(Debug, Clone)]
pub enum MessageKind {
    /// Liveness check.
    Ping,
    /// Answer to a [MessageKind::Ping].
    Pong,
    /// Ask for the closest contacts to the target of `traversed`.
    ///
    /// `traversed` holds the nodes the requester already went through, so
    /// the receiver can learn from them.
    FindNode { traversed: Shortlist },
    /// Answer to a [MessageKind::FindNode].
    FoundNodes { candidates: Shortlist },
}

impl Message {
    pub fn ping(sender: Contact, receiver: Contact) -> Message {
        Message {
            sender,
            receiver,
            kind: MessageKind::Ping,
        }
    }

    pub fn find_node(sender: Contact, receiver: Contact, traversed: Shortlist) -> Message {
        Message {
            sender,
            receiver,
            kind: MessageKind::FindNode { traversed },
        }
    }

    /// Reply to this message with a [MessageKind::Pong].
    pub fn pong(&self) -> Message {
        self.reply(MessageKind::Pong)
    }

    /// Reply to this message with a [MessageKind::FoundNodes].
    pub fn found_nodes(&self, candidates: Shortlist) -> Message {
        self.reply(MessageKind::FoundNodes { candidates })
    }

    // === Getters ===

    pub fn sender(&self) -> &Contact {
        &self.sender
    }

    pub fn receiver(&self) -> &Contact {
        &self.receiver
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn into_kind(self) -> MessageKind {
        self.kind
    }

    /// The lookup target of a [MessageKind::FindNode] or a [MessageKind::FoundNodes].
    pub fn target(&self) -> Option<&Id> {
        match &self.kind {
            MessageKind::FindNode { traversed } => Some(traversed.target()),
            MessageKind::FoundNodes { candidates } => Some(candidates.target()),
            _ => None,
        }
    }

    // === Wire format ===

    /// Encode this message.
    ///
    /// Shortlists keep their target, capacity and order, but not the status of
    /// their elements: they are all candidates again once decoded.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let bytes = self.to_serde_message().to_bytes()?;

        Ok(bytes.into())
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::KademliaMessage::from_bytes(bytes.as_ref())?)
    }

    // === Private Methods ===

    fn reply(&self, kind: MessageKind) -> Message {
        Message {
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            kind,
        }
    }

    fn to_serde_message(&self) -> internal::KademliaMessage {
        let (kind, shortlist) = match &self.kind {
            MessageKind::Ping => (internal::PING, None),
            MessageKind::Pong => (internal::PONG, None),
            MessageKind::FindNode { traversed } => (internal::FIND_NODE, Some(traversed)),
            MessageKind::FoundNodes { candidates } => (internal::FOUND_NODES, Some(candidates)),
        };

        internal::KademliaMessage {
            kind: kind.to_string(),
            bit_length: self.sender.id().bit_length(),
            sender: contact_to_bytes(&self.sender),
            receiver: contact_to_bytes(&self.receiver),
            target: shortlist.map(|shortlist| shortlist.target().to_vec()),
            nodes: shortlist.map(|shortlist| {
                shortlist
                    .contacts()
                    .map(|contact| ByteBuf::from(contact_to_bytes(contact)))
                    .collect()
            }),
            capacity: shortlist.map(|shortlist| shortlist.k() as u32),
        }
    }

    fn from_serde_message(msg: internal::KademliaMessage) -> Result<Message> {
        let bit_length = msg.bit_length;

        let sender = bytes_to_contact(bit_length, &msg.sender)?;
        let receiver = bytes_to_contact(bit_length, &msg.receiver)?;

        let kind = match msg.kind.as_str() {
            internal::PING => MessageKind::Ping,
            internal::PONG => MessageKind::Pong,
            internal::FIND_NODE => MessageKind::FindNode {
                traversed: bytes_to_shortlist(bit_length, &msg)?,
            },
            internal::FOUND_NODES => MessageKind::FoundNodes {
                candidates: bytes_to_shortlist(bit_length, &msg)?,
            },
            _ => return Err(Error::InvalidMessage("unknown message kind")),
        };

        Ok(Message {
            sender,
            receiver,
            kind,
        })
    }
}

fn bytes_to_shortlist(bit_length: u16, msg: &internal::KademliaMessage) -> Result<Shortlist> {
    let target = msg
        .target
        .as_ref()
        .ok_or(Error::InvalidMessage("missing target"))?;
    let capacity = msg
        .capacity
        .ok_or(Error::InvalidMessage("missing shortlist capacity"))?;

    let mut shortlist = Shortlist::new(Id::from_bytes(bit_length, target)?, capacity as usize);

    for bytes in msg.nodes.iter().flatten() {
        shortlist.add(bytes_to_contact(bit_length, bytes)?);
    }

    Ok(shortlist)
}

/// `id || ip || port`, where the ip is 4 or 16 bytes depending on its version.
fn contact_to_bytes(contact: &Contact) -> Vec<u8> {
    let mut bytes = contact.id().to_vec();

    match contact.ip() {
        IpAddr::V4(ip) => bytes.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => bytes.extend_from_slice(&ip.octets()),
    };
    bytes.extend_from_slice(&contact.port().to_be_bytes());

    bytes
}

fn bytes_to_contact(bit_length: u16, bytes: &[u8]) -> Result<Contact> {
    let id_size = (bit_length as usize).div_ceil(8);

    if bytes.len() < id_size {
        return Err(Error::InvalidContact(bytes.len()));
    }

    let (id, address) = bytes.split_at(id_size);
    let id = Id::from_bytes(bit_length, id)?;

    let ip = match address.len() {
        6 => {
            let octets: [u8; 4] = address[..4]
                .try_into()
                .map_err(|_| Error::InvalidContact(bytes.len()))?;
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        18 => {
            let octets: [u8; 16] = address[..16]
                .try_into()
                .map_err(|_| Error::InvalidContact(bytes.len()))?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return Err(Error::InvalidContact(bytes.len())),
    };

    let port = u16::from_be_bytes([address[address.len() - 2], address[address.len() - 1]]);

    Ok(Contact::new(id, SocketAddr::new(ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(value: u64, address: SocketAddr) -> Contact {
        Contact::new(Id::from_u64(32, value).unwrap(), address)
    }

    #[test]
    fn reply_swaps_sender_and_receiver() {
        let a = contact(1, SocketAddr::from(([10, 0, 0, 1], 1)));
        let b = contact(2, SocketAddr::from(([10, 0, 0, 2], 2)));

        let ping = Message::ping(a.clone(), b.clone());
        let pong = ping.pong();

        assert_eq!(pong.sender(), &b);
        assert_eq!(pong.receiver(), &a);
        assert!(matches!(pong.kind(), MessageKind::Pong));
        assert_eq!(pong.target(), None);
    }

    #[test]
    fn ping_over_the_wire() {
        let a = Contact::random(160);
        let b = Contact::random(160);

        let bytes = Message::ping(a.clone(), b.clone()).to_bytes().unwrap();
        let decoded = Message::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.sender(), &a);
        assert_eq!(decoded.sender().address(), a.address());
        assert_eq!(decoded.receiver(), &b);
        assert!(matches!(decoded.kind(), MessageKind::Ping));
    }

    #[test]
    fn find_node_over_the_wire() {
        let a = contact(1, SocketAddr::from(([10, 0, 0, 1], 6881)));
        let b = contact(2, "[2001:db8::1]:6882".parse().unwrap());

        let target = Id::from_u64(32, 8).unwrap();
        let mut traversed = Shortlist::new(target.clone(), 7);
        traversed.add(a.clone());
        traversed.add(b.clone());

        let request = Message::find_node(a.clone(), b.clone(), traversed);
        let decoded = Message::from_bytes(request.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.target(), Some(&target));

        let MessageKind::FindNode { traversed } = decoded.into_kind() else {
            panic!("expected a find_node request")
        };

        assert_eq!(traversed.k(), 7);

        let contacts = traversed.into_contacts();
        assert_eq!(contacts, vec![a.clone(), b.clone()]);
        assert_eq!(contacts[0].address(), a.address());
        assert_eq!(contacts[1].address(), b.address());
    }

    #[test]
    fn odd_bit_length() {
        let a = Contact::random(13);
        let b = Contact::random(13);

        let mut candidates = Shortlist::new(Id::random(13), 20);
        candidates.add(a.clone());

        let reply = Message::ping(b, a.clone()).found_nodes(candidates);
        let decoded = Message::from_bytes(reply.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.sender(), &a);
        assert_eq!(decoded.sender().id().bit_length(), 13);

        let MessageKind::FoundNodes { candidates } = decoded.into_kind() else {
            panic!("expected a found_nodes reply")
        };
        assert_eq!(candidates.into_contacts(), vec![a]);
    }

    #[test]
    fn invalid_messages() {
        assert!(matches!(
            Message::from_bytes(b"not bencode"),
            Err(Error::BencodeError(_))
        ));

        let a = contact(1, SocketAddr::from(([10, 0, 0, 1], 1)));

        let mut unknown = Message::ping(a.clone(), a.clone()).to_serde_message();
        unknown.kind = "store".to_string();
        assert!(matches!(
            Message::from_bytes(unknown.to_bytes().unwrap()),
            Err(Error::InvalidMessage(_))
        ));

        let mut missing_target = Message::ping(a.clone(), a.clone()).to_serde_message();
        missing_target.kind = internal::FIND_NODE.to_string();
        assert!(matches!(
            Message::from_bytes(missing_target.to_bytes().unwrap()),
            Err(Error::InvalidMessage(_))
        ));

        let mut truncated = Message::ping(a.clone(), a).to_serde_message();
        truncated.sender.pop();
        assert!(matches!(
            Message::from_bytes(truncated.to_bytes().unwrap()),
            Err(Error::InvalidContact(9))
        ));
    }
}
