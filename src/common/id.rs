//! Kademlia node Id or a lookup target
use std::fmt::{self, Debug, Display, Formatter};
use std::net::IpAddr;

use bytes::Bytes;
use rand::Rng;
use sha3::{Digest, Sha3_224, Sha3_256, Sha3_384, Sha3_512};

use crate::{Error, Result};

/// The default size of node IDs in bits.
pub const DEFAULT_BIT_LENGTH: u16 = 160;
/// The widest identifier space supported.
pub const MAX_BIT_LENGTH: u16 = 2048;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Kademlia node Id or a lookup target.
///
/// A fixed length bit vector, stored as `ceil(bit_length / 8)` big endian bytes,
/// where the unused high bits of the first byte are always zero.
pub struct Id {
    bits: u16,
    bytes: Bytes,
}

impl Id {
    /// Create a new Id from some bytes. Returns Err if `bytes` is not exactly
    /// `ceil(bit_length / 8)` long, or if it has bits set above `bit_length`.
    pub fn from_bytes<T: AsRef<[u8]>>(bit_length: u16, bytes: T) -> Result<Id> {
        validate_bit_length(bit_length)?;

        let bytes = bytes.as_ref();
        let expected = byte_len(bit_length);

        if bytes.len() != expected {
            return Err(Error::InvalidIdSize {
                expected,
                actual: bytes.len(),
            });
        }

        if bytes[0] & !leading_mask(bit_length) != 0 {
            return Err(Error::IdOutOfRange(bit_length));
        }

        Ok(Id {
            bits: bit_length,
            bytes: Bytes::copy_from_slice(bytes),
        })
    }

    /// Create an Id holding the integer `value`.
    pub fn from_u64(bit_length: u16, value: u64) -> Result<Id> {
        validate_bit_length(bit_length)?;

        if bit_length < 64 && value >> bit_length != 0 {
            return Err(Error::IdOutOfRange(bit_length));
        }

        let mut bytes = vec![0_u8; byte_len(bit_length)];
        let len = bytes.len();
        let n = len.min(8);
        bytes[len - n..].copy_from_slice(&value.to_be_bytes()[8 - n..]);

        Ok(Id {
            bits: bit_length,
            bytes: bytes.into(),
        })
    }

    /// Generate a uniformly random Id.
    ///
    /// # Panics
    ///
    /// If `bit_length` is zero or above [MAX_BIT_LENGTH].
    pub fn random(bit_length: u16) -> Id {
        assert_bit_length(bit_length);

        let mut bytes = vec![0_u8; byte_len(bit_length)];
        rand::thread_rng().fill(&mut bytes[..]);
        bytes[0] &= leading_mask(bit_length);

        Id {
            bits: bit_length,
            bytes: bytes.into(),
        }
    }

    /// Derive an Id from a network address.
    ///
    /// Hashes the ip octets followed by the big endian port with the narrowest
    /// SHA3 variant that covers `bit_length`. Wider identifiers are extended with
    /// more blocks, each hashing the same input followed by a block counter.
    ///
    /// # Panics
    ///
    /// If `bit_length` is zero or above [MAX_BIT_LENGTH].
    pub fn from_address(ip: IpAddr, port: u16, bit_length: u16) -> Id {
        assert_bit_length(bit_length);

        let len = byte_len(bit_length);

        let mut bytes = match bit_length {
            1..=224 => digest::<Sha3_224>(ip, port, len),
            225..=256 => digest::<Sha3_256>(ip, port, len),
            257..=384 => digest::<Sha3_384>(ip, port, len),
            _ => digest::<Sha3_512>(ip, port, len),
        };
        bytes[0] &= leading_mask(bit_length);

        Id {
            bits: bit_length,
            bytes: bytes.into(),
        }
    }

    // === Getters ===

    /// Width of this Id's identifier space.
    pub fn bit_length(&self) -> u16 {
        self.bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Returns the bit at `index`, counting from the least significant bit.
    pub fn bit(&self, index: usize) -> bool {
        let (byte, mask) = bit_position(index, self.bytes.len());
        self.bytes[byte] & mask != 0
    }

    // === Public Methods ===

    /// XOR distance between this Id and a target Id.
    ///
    /// # Panics
    ///
    /// If both Ids don't belong to the same identifier space.
    pub fn distance(&self, other: &Id) -> Distance {
        assert_eq!(
            self.bits, other.bits,
            "Can't compare Ids from different identifier spaces"
        );

        let xor: Vec<u8> = self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        Distance(xor.into())
    }

    /// Index of the k-bucket `other` falls into, in a routing table owned by this Id.
    ///
    /// That is the position of the highest differing bit, or `None` if both are equal.
    pub fn bucket_index(&self, other: &Id) -> Option<usize> {
        self.distance(other).highest_bit()
    }

    /// Generate a random Id that would fall into the bucket at `index`
    /// of a routing table owned by this Id.
    ///
    /// # Panics
    ///
    /// If `index` is not smaller than [Self::bit_length].
    pub fn random_in_bucket(&self, index: usize) -> Id {
        assert!(
            index < self.bits as usize,
            "Bucket index {index} out of a {} bits identifier space",
            self.bits
        );

        let mut rng = rand::thread_rng();
        let mut bytes = self.bytes.to_vec();

        for i in 0..=index {
            let (byte, mask) = bit_position(i, bytes.len());

            if i == index || rng.gen::<bool>() {
                bytes[byte] ^= mask;
            }
        }

        Id {
            bits: self.bits,
            bytes: bytes.into(),
        }
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.bytes.iter() {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// XOR of two [Id]s, ordered as a big endian integer.
pub struct Distance(Bytes);

impl Distance {
    /// Distance from an Id to itself.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Position of the highest set bit, counting from the least significant bit.
    pub fn highest_bit(&self) -> Option<usize> {
        let len = self.0.len();

        self.0
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != 0)
            .map(|(i, byte)| (len - 1 - i) * 8 + (7 - byte.leading_zeros() as usize))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Distance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Distance(")?;
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

fn byte_len(bit_length: u16) -> usize {
    (bit_length as usize).div_ceil(8)
}

/// Mask of the bits of the first byte that belong to the identifier.
fn leading_mask(bit_length: u16) -> u8 {
    match bit_length % 8 {
        0 => 0xff,
        rem => (1_u8 << rem) - 1,
    }
}

fn bit_position(index: usize, len: usize) -> (usize, u8) {
    (len - 1 - index / 8, 1 << (index % 8))
}

fn validate_bit_length(bit_length: u16) -> Result<()> {
    if bit_length == 0 || bit_length > MAX_BIT_LENGTH {
        return Err(Error::InvalidBitLength(bit_length));
    }

    Ok(())
}

fn assert_bit_length(bit_length: u16) {
    assert!(
        bit_length > 0 && bit_length <= MAX_BIT_LENGTH,
        "Invalid identifier bit length: {bit_length}"
    );
}

fn digest<D: Digest>(ip: IpAddr, port: u16, len: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(len);
    let mut block: u32 = 0;

    while output.len() < len {
        let mut hasher = D::new();

        match ip {
            IpAddr::V4(ip) => hasher.update(ip.octets()),
            IpAddr::V6(ip) => hasher.update(ip.octets()),
        }
        hasher.update(port.to_be_bytes());

        if block > 0 {
            hasher.update(block.to_be_bytes());
        }

        output.extend_from_slice(&hasher.finalize());
        block += 1;
    }

    output.truncate(len);
    output
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn distance_to_self() {
        let id = Id::random(DEFAULT_BIT_LENGTH);
        let distance = id.distance(&id);

        assert!(distance.is_zero());
        assert_eq!(distance.highest_bit(), None);
    }

    #[test]
    fn distance_is_symmetric() {
        for _ in 0..20 {
            let a = Id::random(37);
            let b = Id::random(37);

            assert_eq!(a.distance(&b), b.distance(&a));
        }
    }

    #[test]
    fn distance_to_id() {
        let three = Id::from_u64(32, 3).unwrap();
        let two = Id::from_u64(32, 2).unwrap();

        let one = Id::from_u64(32, 1).unwrap();
        let zero = Id::from_u64(32, 0).unwrap();

        assert_eq!(three.distance(&two), one.distance(&zero));
        assert_eq!(three.distance(&two).highest_bit(), Some(0));
    }

    #[test]
    fn distance_orders_as_integer() {
        let target = Id::from_u64(64, 0).unwrap();

        let near = Id::from_u64(64, 0x00ff_ffff_ffff_ffff).unwrap();
        let far = Id::from_u64(64, 0x0100_0000_0000_0000).unwrap();

        assert!(near.distance(&target) < far.distance(&target));
    }

    #[test]
    fn bucket_index() {
        let zero = Id::from_u64(32, 0).unwrap();

        assert_eq!(zero.bucket_index(&Id::from_u64(32, 1).unwrap()), Some(0));
        assert_eq!(zero.bucket_index(&Id::from_u64(32, 0x1ff).unwrap()), Some(8));
        assert_eq!(
            zero.bucket_index(&Id::from_u64(32, 0x8000_0000).unwrap()),
            Some(31)
        );
        assert_eq!(zero.bucket_index(&zero), None);
    }

    #[test]
    fn random_in_bucket() {
        let id = Id::random(32);

        for index in 0..32 {
            let other = id.random_in_bucket(index);
            assert_eq!(id.bucket_index(&other), Some(index));
        }
    }

    #[test]
    fn from_address_is_stable() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1));

        let a = Id::from_address(ip, 123, 13);
        let b = Id::from_address(ip, 123, 13);

        assert_eq!(a, b);
        assert_eq!(a.as_bytes().len(), 2);
        assert_eq!(a.as_bytes()[0] & 0b1110_0000, 0);

        assert_ne!(
            Id::from_address(ip, 123, DEFAULT_BIT_LENGTH),
            Id::from_address(ip, 124, DEFAULT_BIT_LENGTH)
        );
    }

    #[test]
    fn from_address_wider_than_digest() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

        let id = Id::from_address(ip, 6881, 1500);

        assert_eq!(id.as_bytes().len(), 188);
        assert_eq!(id, Id::from_address(ip, 6881, 1500));
        // Extension blocks must not repeat the first block.
        assert_ne!(id.as_bytes()[..64], id.as_bytes()[64..128]);
    }

    #[test]
    fn from_bytes_validation() {
        assert!(matches!(
            Id::from_bytes(32, [0, 0, 0]),
            Err(Error::InvalidIdSize {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            Id::from_bytes(12, [0x10, 0]),
            Err(Error::IdOutOfRange(12))
        ));
        assert!(matches!(
            Id::from_bytes(0, []),
            Err(Error::InvalidBitLength(0))
        ));

        let id = Id::from_bytes(12, [0x0f, 0xff]).unwrap();
        assert_eq!(id, Id::from_u64(12, 0xfff).unwrap());
    }

    #[test]
    fn from_u64_out_of_range() {
        assert!(matches!(
            Id::from_u64(8, 256),
            Err(Error::IdOutOfRange(8))
        ));
        assert!(Id::from_u64(8, 255).is_ok());
        assert!(Id::from_u64(64, u64::MAX).is_ok());
    }

    #[test]
    fn display() {
        let id = Id::from_u64(32, 0x1a).unwrap();

        assert_eq!(id.to_string(), "0000001a");
        assert_eq!(format!("{:?}", id), "Id(0000001a)");
    }
}
