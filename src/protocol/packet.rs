use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::{ACK_PREFIX, ADDRESS_LENGTH, HEADER_LENGTH, ROUTER_PREFIX};
use crate::error::FormatError;

/// Node identifier as carried in the fixed-width header fields.
///
/// The empty address is the "nobody" sentinel used by control packets; it
/// encodes as an all-zero field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Sentinel for "no destination" / "no source".
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Router names start with `R`; every other address is a host.
    pub fn is_router(&self) -> bool {
        self.0.starts_with(ROUTER_PREFIX)
    }

    /// Checks that the address fits a header field byte for byte.
    pub fn check_field(&self) -> Result<(), FormatError> {
        if !self.0.is_ascii() {
            return Err(FormatError::NonAsciiAddress(self.0.clone()));
        }
        if self.0.len() > ADDRESS_LENGTH {
            return Err(FormatError::AddressTooLong(self.0.clone()));
        }
        Ok(())
    }

    fn to_field(&self) -> Result<String, FormatError> {
        self.check_field()?;
        Ok(format!("{:0>width$}", self.0, width = ADDRESS_LENGTH))
    }

    // Lossy for addresses whose real value starts with '0'.
    fn from_field(field: &str) -> Self {
        Self(field.trim_start_matches('0').to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    Data,
    Control,
}

impl PacketKind {
    pub fn tag(self) -> char {
        match self {
            PacketKind::Data => '1',
            PacketKind::Control => '2',
        }
    }
}

impl TryFrom<char> for PacketKind {
    type Error = FormatError;

    fn try_from(tag: char) -> Result<Self, Self::Error> {
        match tag {
            '1' => Ok(PacketKind::Data),
            '2' => Ok(PacketKind::Control),
            other => Err(FormatError::UnknownKind(other)),
        }
    }
}

/// A network-layer packet shared by data and control traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dst: Address,
    pub src: Address,
    pub kind: PacketKind,
    pub payload: String,
}

impl Packet {
    pub fn data(dst: impl Into<Address>, src: impl Into<Address>, payload: impl Into<String>) -> Self {
        Self {
            dst: dst.into(),
            src: src.into(),
            kind: PacketKind::Data,
            payload: payload.into(),
        }
    }

    /// Routing advertisement carrying a serialized table. Both addresses are
    /// the sentinel: advertisements are link-local.
    pub fn control(payload: impl Into<String>) -> Self {
        Self {
            dst: Address::none(),
            src: Address::none(),
            kind: PacketKind::Control,
            payload: payload.into(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind == PacketKind::Data && self.payload.starts_with(ACK_PREFIX)
    }

    /// Acknowledgment data packet answering `self`, sent by `from`.
    pub fn ack(&self, from: &Address) -> Self {
        Packet::data(
            self.src.clone(),
            from.clone(),
            format!("{}{}", ACK_PREFIX, self.src),
        )
    }

    /// `[dst:5][src:5][kind:1][payload]`, addresses left-padded with `0`.
    pub fn encode(&self) -> Result<String, FormatError> {
        let mut out = String::with_capacity(HEADER_LENGTH + self.payload.len());
        out.push_str(&self.dst.to_field()?);
        out.push_str(&self.src.to_field()?);
        out.push(self.kind.tag());
        out.push_str(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &str) -> Result<Self, FormatError> {
        let truncated = || FormatError::Truncated { len: bytes.len() };

        let dst = bytes.get(..ADDRESS_LENGTH).ok_or_else(truncated)?;
        let src = bytes
            .get(ADDRESS_LENGTH..ADDRESS_LENGTH * 2)
            .ok_or_else(truncated)?;
        let tag = bytes
            .get(ADDRESS_LENGTH * 2..)
            .and_then(|rest| rest.chars().next())
            .ok_or_else(truncated)?;
        let kind = PacketKind::try_from(tag)?;
        // The tag is ASCII here, so HEADER_LENGTH is a char boundary.
        let payload = &bytes[HEADER_LENGTH..];

        Ok(Self {
            dst: Address::from_field(dst),
            src: Address::from_field(src),
            kind,
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} [{:?}] {}",
            if self.src.is_none() { "-" } else { self.src.as_str() },
            if self.dst.is_none() { "-" } else { self.dst.as_str() },
            self.kind,
            self.payload
        )
    }
}
