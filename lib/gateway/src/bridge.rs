//! The optional upstream MQTT broker the gateway may bridge to. Kept as a
//! capability trait (spec.md §9: "global callback + void* self-pointer →
//! closure/callback value") rather than the reference's registered
//! function-pointer pair: the gateway polls it once per tick instead.

use mqttsn_core::config::MAX_PAYLOAD_LEN;
use mqttsn_core::topic::TopicName;

/// One message received from the upstream broker, ready to be mapped back
/// onto an MQTT-SN topic-id and fanned out to local subscribers.
pub struct BridgeMessage {
    pub topic: TopicName,
    pub data: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
    pub qos: u8,
    pub retain: bool,
}

/// Upstream MQTT broker capability consumed by the gateway. The engine
/// never speaks MQTT on the wire itself (spec.md §1); an implementer
/// drives a real MQTT client (e.g. `rumqttc`) behind this trait.
pub trait MqttBridge {
    /// Whether the upstream connection is currently established. Polled
    /// once per gateway tick to detect connect-state transitions.
    fn is_connected(&self) -> bool;

    fn publish(&mut self, topic: &str, data: &[u8], qos: u8, retain: bool);
    fn subscribe(&mut self, topic: &str, qos: u8);
    fn unsubscribe(&mut self, topic: &str);

    /// Drains at most one buffered inbound message per call; `None` when
    /// there is nothing pending.
    fn poll_incoming(&mut self) -> Option<BridgeMessage>;
}

/// A no-op bridge: `is_connected` always false, nothing is ever relayed.
/// The default `B` for a [`crate::Gateway`] that does not bridge upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBridge;

impl MqttBridge for NoBridge {
    fn is_connected(&self) -> bool {
        false
    }
    fn publish(&mut self, _topic: &str, _data: &[u8], _qos: u8, _retain: bool) {}
    fn subscribe(&mut self, _topic: &str, _qos: u8) {}
    fn unsubscribe(&mut self, _topic: &str) {}
    fn poll_incoming(&mut self) -> Option<BridgeMessage> {
        None
    }
}

/// Composes the upstream topic name for a client-side `name`: `prefix/name`
/// unless `prefix` is empty or `name` starts with `$` (spec.md §4.5).
pub fn compose_upstream(prefix: &str, name: &str) -> Option<TopicName> {
    if prefix.is_empty() || name.starts_with('$') {
        return TopicName::try_from(name).ok();
    }
    let mut out = TopicName::new();
    out.push_str(prefix).ok()?;
    out.push('/').ok()?;
    out.push_str(name).ok()?;
    Some(out)
}

/// Strips `prefix/` from an inbound upstream topic, if present.
pub fn strip_prefix<'a>(prefix: &str, topic: &'a str) -> &'a str {
    if prefix.is_empty() {
        return topic;
    }
    topic.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')).unwrap_or(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_with_prefix() {
        assert_eq!(compose_upstream("gw1", "sensors/a").unwrap().as_str(), "gw1/sensors/a");
    }

    #[test]
    fn skips_dollar_topics() {
        assert_eq!(compose_upstream("gw1", "$SYS/x").unwrap().as_str(), "$SYS/x");
    }

    #[test]
    fn no_prefix_is_verbatim() {
        assert_eq!(compose_upstream("", "x").unwrap().as_str(), "x");
    }

    #[test]
    fn strips_matching_prefix() {
        assert_eq!(strip_prefix("gw1", "gw1/sensors/a"), "sensors/a");
    }

    #[test]
    fn strip_leaves_unmatched_topic_untouched() {
        assert_eq!(strip_prefix("gw1", "other/x"), "other/x");
    }
}
