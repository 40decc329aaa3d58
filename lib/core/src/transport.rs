use crate::address::Address;

/// Outcome of a non-blocking receive attempt.
pub enum RecvOutcome<'a> {
    /// No packet is currently available.
    Empty,
    /// The caller's buffer was too small to hold the next queued packet;
    /// the caller may drop it and try again (it will not be returned).
    TooSmall,
    /// A whole packet of `bytes` length, from `from`.
    Packet { bytes: &'a [u8], from: Address },
}

/// Packet-level, non-blocking, non-IP transport. Reliability lives above
/// this layer entirely: a `Transport` only moves bytes.
pub trait Transport {
    /// Sends `bytes` to `dest`. Returns the number of bytes written, or
    /// `0` on error (dropped by convention, never observed as a panic).
    fn send(&mut self, bytes: &[u8], dest: &Address) -> u8;

    /// Attempts to receive one packet into `buf`, reporting its source.
    fn recv<'a>(&mut self, buf: &'a mut [u8]) -> RecvOutcome<'a>;

    /// Broadcasts `bytes` to every reachable peer. Returns bytes written,
    /// `0` on error.
    fn broadcast(&mut self, bytes: &[u8]) -> u8;
}
