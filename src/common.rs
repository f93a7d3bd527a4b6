//! Miscellaneous common structs used throughout the library.

mod contact;
mod id;
mod kbucket;
pub mod messages;
mod routing_table;
mod shortlist;

pub use contact::*;
pub use id::*;
pub use kbucket::*;
pub use messages::*;
pub use routing_table::*;
pub use shortlist::*;
