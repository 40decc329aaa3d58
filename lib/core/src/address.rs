use crate::config::MAX_ADDR_LEN;
use heapless::Vec;

/// An opaque transport peer address, at most [`MAX_ADDR_LEN`] bytes.
/// Transports are free to interpret the bytes however they like (a radio
/// node id, a serial multiplexer channel, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Address(Vec<u8, MAX_ADDR_LEN>);

impl Address {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Vec::from_slice(bytes).ok().map(Address)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x?}", self.0.as_slice())
    }
}
