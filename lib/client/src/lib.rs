//! MQTT-SN client engine: discovery, connect, register/subscribe/publish
//! and keepalive, driven entirely by [`Client::poll`]. See `SPEC_FULL.md`
//! at the workspace root for the full design.

pub mod client;
pub mod gateway_table;
pub mod state;

pub use client::{Client, PublishCallback};
pub use gateway_table::{GatewayRecord, GatewayTable};
pub use state::State;
