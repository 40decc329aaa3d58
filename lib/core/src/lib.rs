//! Wire codec, reliability primitives and capability traits shared by the
//! MQTT-SN client and gateway engines. See `SPEC_FULL.md` at the
//! workspace root for the full design.

pub mod address;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod flags;
pub mod inflight;
pub mod topic;
pub mod transport;

#[cfg(feature = "std")]
pub mod stdlib;

#[cfg(feature = "test-util")]
pub mod testsupport;

pub use address::Address;
pub use codec::{decode, encode, Message};
pub use device::Device;
pub use error::{Error, Result};
pub use inflight::{InFlight, TickOutcome};
pub use topic::{PubTopic, SubTopic, TopicMapping, TopicName};
pub use transport::{RecvOutcome, Transport};
