pub mod packet;
pub mod routing_table;

pub use packet::*;
pub use routing_table::*;

/// Width of the zero-padded destination and source fields.
pub const ADDRESS_LENGTH: usize = 5;
/// Width of the kind tag.
pub const KIND_LENGTH: usize = 1;
/// Fixed header: destination, source, kind.
pub const HEADER_LENGTH: usize = ADDRESS_LENGTH * 2 + KIND_LENGTH;

/// Application-level acknowledgment marker carried inside data payloads.
pub const ACK_PREFIX: &str = "ACK:";

/// Leading character of every router name; anything else is a host.
pub const ROUTER_PREFIX: char = 'R';
