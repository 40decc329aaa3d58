//! MQTT-SN gateway engine: session table, topic mapping, sleeping-client
//! store-and-forward and optional MQTT broker bridging. See
//! `SPEC_FULL.md` at the workspace root for the full design.

pub mod bridge;
pub mod gateway;
pub mod mapping;
pub mod session;

pub use bridge::{BridgeMessage, MqttBridge, NoBridge};
pub use gateway::Gateway;
pub use mapping::MappingTable;
pub use session::{QueuedMessage, Session, SessionState, Subscription};
