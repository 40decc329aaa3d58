//! A single client session, as tracked by the gateway: connect state,
//! subscriptions, and the per-session sleepy queue (spec.md §4.6).

use heapless::{Deque, Vec};
use mqttsn_core::config::{
    DEFAULT_MAX_BUFFERED_MSGS, MAX_CLIENTID_LEN, MAX_INSTANCE_TOPICS, MAX_PAYLOAD_LEN,
};
use mqttsn_core::{Address, InFlight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Asleep,
    Awake,
}

/// A session's hold on one topic-id, with the QoS it subscribed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub tid: u16,
    pub qos: u8,
}

/// A serialized PUBLISH frame buffered for a sleeping session.
pub struct QueuedMessage {
    pub tid: u16,
    pub qos: u8,
    pub retain: bool,
    pub data: Vec<u8, MAX_PAYLOAD_LEN>,
}

/// One connected (or sleeping) MQTT-SN client, as seen by the gateway.
/// "A session exists iff its client_id is non-empty" (spec.md §3) —
/// `is_live` is the explicit predicate this engine uses in place of the
/// reference's `operator bool()`.
pub struct Session<const MSG_CAP: usize> {
    pub client_id: heapless::String<MAX_CLIENTID_LEN>,
    pub addr: Address,
    pub state: SessionState,
    pub clean_session: bool,
    pub keepalive_interval_ms: u32,
    pub keepalive_timeout_ms: u32,
    pub last_in: u32,
    pub pub_topics: Vec<u16, MAX_INSTANCE_TOPICS>,
    pub sub_topics: Vec<Subscription, MAX_INSTANCE_TOPICS>,
    pub in_flight: InFlight<MSG_CAP>,
    pub sleepy_queue: Deque<QueuedMessage, DEFAULT_MAX_BUFFERED_MSGS>,
}

impl<const MSG_CAP: usize> Session<MSG_CAP> {
    pub fn new(client_id: &str, addr: Address, keepalive_interval_ms: u32, clean_session: bool) -> Self {
        Session {
            client_id: heapless::String::try_from(client_id).unwrap_or_default(),
            addr,
            state: SessionState::Active,
            clean_session,
            keepalive_interval_ms,
            keepalive_timeout_ms: mqttsn_core::config::keepalive_timeout_ms(keepalive_interval_ms),
            last_in: 0,
            pub_topics: Vec::new(),
            sub_topics: Vec::new(),
            in_flight: InFlight::new(),
            sleepy_queue: Deque::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        !self.client_id.is_empty()
    }

    pub fn subscription(&self, tid: u16) -> Option<&Subscription> {
        self.sub_topics.iter().find(|s| s.tid == tid)
    }

    /// Adds or updates (QoS upgrade) a subscription. Returns `false` if the
    /// table is full and this would be a new entry.
    pub fn subscribe(&mut self, tid: u16, qos: u8) -> bool {
        if let Some(existing) = self.sub_topics.iter_mut().find(|s| s.tid == tid) {
            existing.qos = qos;
            return true;
        }
        self.sub_topics.push(Subscription { tid, qos }).is_ok()
    }

    pub fn unsubscribe(&mut self, tid: u16) {
        if let Some(idx) = self.sub_topics.iter().position(|s| s.tid == tid) {
            self.sub_topics.swap_remove(idx);
        }
    }

    pub fn add_pub_topic(&mut self, tid: u16) -> bool {
        if self.pub_topics.contains(&tid) {
            return true;
        }
        self.pub_topics.push(tid).is_ok()
    }

    /// Enqueues a message for a sleeping session; drops the new message on
    /// overflow (spec.md §4.6: "On overflow: drop new").
    pub fn enqueue(&mut self, msg: QueuedMessage) {
        if self.sleepy_queue.push_back(msg).is_err() {
            log::debug!("sleepy queue full for {}, dropping new message", self.client_id);
        }
    }
}
