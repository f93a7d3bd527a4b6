//! Struct and implementation of the Contact entry in the Kademlia routing table
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use rand::Rng;

use crate::common::{Distance, Id};

#[derive(Clone)]
/// A network participant: its [Id] and where to reach it.
///
/// Two contacts are equal if their ids are equal, regardless of their addresses.
pub struct Contact {
    id: Id,
    address: SocketAddr,
}

impl Contact {
    /// Creates a new Contact from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Contact {
        Contact { id, address }
    }

    /// Creates a new Contact with an id derived from hashing its address.
    pub fn from_address(address: SocketAddr, bit_length: u16) -> Contact {
        Contact {
            id: Id::from_address(address.ip(), address.port(), bit_length),
            address,
        }
    }

    /// Creates a contact with a random Ipv6 address and a random unprivileged port.
    pub fn random(bit_length: u16) -> Contact {
        let mut rng = rand::thread_rng();

        let ip = Ipv6Addr::from(rng.gen::<u128>());
        let port = rng.gen_range(1024..65535);

        Contact::from_address(SocketAddr::new(IpAddr::V6(ip), port), bit_length)
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    // === Public Methods ===

    /// XOR distance between this contact and another one.
    pub fn distance(&self, other: &Contact) -> Distance {
        self.id.distance(&other.id)
    }

    /// XOR distance between this contact and a target [Id].
    pub fn distance_to(&self, target: &Id) -> Distance {
        self.id.distance(target)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Contact({}, {})", self.id, self.address)
    }
}
