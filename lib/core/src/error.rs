use thiserror::Error;

/// Every failure mode the engine can hit. Handlers are total: no panics on
/// untrusted input, every bad frame maps to one of these and is otherwise
/// dropped silently per spec.md §7.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// Decode failed: bad length, reserved length-prefix of 1, unknown
    /// message type, or a body shorter than its fixed fields.
    #[error("malformed frame")]
    MalformedFrame,

    /// Encode didn't fit the caller's buffer, or recv's buffer was too
    /// small for the next queued packet.
    #[error("buffer too small")]
    BufferTooSmall,

    /// A unicast transaction is already in flight for this peer.
    #[error("a transaction is already pending")]
    Busy,

    /// No usable gateway record to send to.
    #[error("no gateway available")]
    NoGateway,

    /// Ingress from a peer that doesn't match any known session/gateway.
    #[error("unknown peer")]
    UnknownPeer,

    /// The in-flight message exhausted its retries; peer is now LOST.
    #[error("retries exhausted, peer lost")]
    RetryExhausted,

    /// A session or topic-mapping table is full.
    #[error("congestion: table full")]
    Congestion,
}

pub type Result<T> = core::result::Result<T, Error>;
