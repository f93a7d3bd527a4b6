use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KademliaMessage {
    #[serde(rename = "y")]
    pub kind: String,

    #[serde(rename = "m")]
    pub bit_length: u16,

    #[serde(rename = "s", with = "serde_bytes")]
    pub sender: Vec<u8>,

    #[serde(rename = "r", with = "serde_bytes")]
    pub receiver: Vec<u8>,

    #[serde(default)]
    #[serde(rename = "t", with = "serde_bytes")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<u8>>,

    #[serde(default)]
    #[serde(rename = "n")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<ByteBuf>>,

    #[serde(default)]
    #[serde(rename = "k")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

impl KademliaMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<KademliaMessage, serde_bencode::Error> {
        let obj = serde_bencode::from_bytes(bytes)?;
        Ok(obj)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        serde_bencode::to_bytes(self)
    }
}

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const FIND_NODE: &str = "find_node";
pub const FOUND_NODES: &str = "found_nodes";
