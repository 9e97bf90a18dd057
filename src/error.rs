//! Error types shared by the codec, the links and the router.
//!
//! Only `RouterError::Protocol` is fatal for a node. A full queue is a
//! best-effort drop and a malformed advertisement is skipped.

use thiserror::Error;

/// Wire-level parse and encode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Kind tag is neither `1` (data) nor `2` (control)
    #[error("unknown packet kind tag: {0:?}")]
    UnknownKind(char),

    /// Byte string shorter than the fixed header
    #[error("packet truncated: {len} bytes, header needs {h}", h = crate::protocol::HEADER_LENGTH)]
    Truncated { len: usize },

    /// Address does not fit the fixed-width field
    #[error("address {0:?} does not fit the {w}-character field", w = crate::protocol::ADDRESS_LENGTH)]
    AddressTooLong(String),

    /// Header fields are fixed byte widths, so addresses must be ASCII
    #[error("address {0:?} is not ASCII")]
    NonAsciiAddress(String),

    /// Serialized table has no `<owner>;` prefix
    #[error("routing table payload has no owner prefix")]
    MissingOwner,

    /// Table segment is not `dest:interface:cost`
    #[error("malformed routing table entry: {0:?}")]
    MalformedEntry(String),

    /// Interface or cost field is not a non-negative integer
    #[error("invalid number in routing table entry: {0:?}")]
    InvalidNumber(String),
}

/// Interface queue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("queue full")]
    QueueFull,

    #[error("queue disconnected")]
    Disconnected,
}

/// Static configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that terminate a router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Codec disagreement with a peer; cannot be skipped safely
    #[error("protocol error: {0}")]
    Protocol(#[from] FormatError),

    #[error("no interface with index {0}")]
    UnknownInterface(usize),
}

/// A host could not put a packet on its link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
