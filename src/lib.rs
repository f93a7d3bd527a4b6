#![doc = include_str!("../README.md")]

mod common;
mod error;
mod testnet;
mod transport;

// Public modules
pub mod node;

pub use crate::common::{
    messages, Contact, Distance, Element, Id, Insertion, KBucket, Message, MessageKind,
    RoutingTable, Shortlist, Status, DEFAULT_BIT_LENGTH, DEFAULT_K, MAX_BIT_LENGTH,
};
pub use bytes::Bytes;
pub use node::{Config, Info, Node};
pub use testnet::{Edge, MemoryTransport, Testnet};
pub use transport::Transport;

pub use error::{Error, Result};
