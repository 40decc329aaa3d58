//! Compile-time tunables shared by the client and gateway engines.
//!
//! These mirror `mqttsn_defines.h` in the reference implementation; sizes
//! stay `const` rather than runtime fields so the fixed-capacity
//! collections that depend on them (`heapless::Vec`, `heapless::String`)
//! can be stack allocated with no dynamic allocation on the hot path.

/// Maximum length in bytes of any transport peer address.
pub const MAX_ADDR_LEN: usize = 10;

/// Maximum total frame length, header included. Transports with a smaller
/// MTU should lower this at the call site.
pub const MAX_MSG_LEN: usize = 32;

/// Maximum payload carried by a single PUBLISH (7 bytes of fixed fields).
pub const MAX_PAYLOAD_LEN: usize = MAX_MSG_LEN - 7;

/// Maximum topic name length (6 bytes of fixed fields in a REGISTER).
pub const MAX_TOPICNAME_LEN: usize = MAX_MSG_LEN - 6;

/// Length of the short (1-byte length) fixed header.
pub const HEADER_LEN: usize = 2;

/// Maximum client identifier length.
pub const MAX_CLIENTID_LEN: usize = 23;

/// Reserved: topic id not yet assigned.
pub const TOPIC_NOTASSIGNED: u16 = 0x0000;

/// Reserved: tombstone for a topic a client has unsubscribed from.
pub const TOPIC_UNSUBSCRIBED: u16 = 0xFFFF;

/// Default keepalive duration, seconds (wire units).
pub const DEFAULT_KEEPALIVE_S: u16 = 30;

/// Timeout for any outstanding unicast message, milliseconds.
pub const T_RETRY_MS: u32 = 5_000;

/// Number of retries before a peer is declared lost.
pub const N_RETRY: u8 = 3;

/// Max initial delay before the first SEARCHGW, milliseconds.
pub const T_SEARCHGW_MS: u32 = 5_000;

/// Cap on the SEARCHGW back-off interval, milliseconds (30 minutes).
pub const MAX_T_SEARCHGW_MS: u32 = 30 * 60 * 1000;

/// Max number of publish OR subscribe topics tracked per client instance.
pub const MAX_INSTANCE_TOPICS: usize = 10;

/// Max number of distinct name<->id mappings a gateway tracks.
pub const MAX_TOPIC_MAPPINGS: usize = 20;

/// Max number of concurrently connected client sessions on a gateway.
pub const MAX_NUM_CLIENTS: usize = 10;

/// Max number of PUBLISH frames queued gateway-wide awaiting local fan-out.
pub const MAX_QUEUED_PUBLISH: usize = 64;

/// Default per-session buffered-message capacity for sleeping clients.
pub const DEFAULT_MAX_BUFFERED_MSGS: usize = 8;

/// `keepalive_timeout = keepalive_interval * (1.1 if >60s else 1.5)`.
///
/// Both sides are milliseconds. Matches invariant #3 in the spec and
/// `mqttsn_client.cpp`/`mqttsn_gateway.cpp`'s identical computation.
pub fn keepalive_timeout_ms(keepalive_interval_ms: u32) -> u32 {
    if keepalive_interval_ms > 60_000 {
        keepalive_interval_ms + keepalive_interval_ms / 10
    } else {
        keepalive_interval_ms + keepalive_interval_ms / 2
    }
}
