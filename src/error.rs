//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Kadroute crate error enum.
pub enum Error {
    /// Identifiers must be between 1 and [crate::MAX_BIT_LENGTH] bits wide.
    #[error("Invalid identifier bit length: {0}")]
    InvalidBitLength(u16),

    /// The byte representation of an [crate::Id] does not match its bit length.
    #[error("Invalid identifier size: expected {expected} bytes, got {actual}")]
    InvalidIdSize {
        /// Bytes needed for the requested bit length.
        expected: usize,
        /// Bytes actually provided.
        actual: usize,
    },

    /// The value has bits set above the identifier's bit length.
    #[error("Identifier value does not fit in {0} bits")]
    IdOutOfRange(u16),

    /// A compact contact is neither an Ipv4 nor an Ipv6 contact for this bit length.
    #[error("Invalid compact contact of {0} bytes")]
    InvalidContact(usize),

    #[error("Failed to parse message bytes: {0}")]
    /// Transparent [serde_bencode::Error]
    BencodeError(#[from] serde_bencode::Error),

    /// Message decoded fine but its fields do not make a valid [crate::Message].
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// Rejected [crate::node::Config].
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),

    /// A [crate::Testnet] node with this [crate::Id] already joined.
    #[error("Node {0} already joined")]
    DuplicateId(crate::Id),

    /// A [crate::Testnet] can't hold more nodes than there are identifiers.
    #[error("{nodes} nodes don't fit in a {bit_length} bits identifier space")]
    IdSpaceExhausted {
        /// Network wide identifier bit length.
        bit_length: u16,
        /// Number of requested nodes.
        nodes: usize,
    },
}

/// Alias for `Result<T, kadroute::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
