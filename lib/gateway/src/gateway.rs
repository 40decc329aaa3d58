//! The gateway engine: session table, shared topic mapping, sleeping-client
//! store-and-forward and optional MQTT broker bridging (spec.md §4.5-§4.7).

use crate::bridge::{compose_upstream, strip_prefix, MqttBridge, NoBridge};
use crate::mapping::MappingTable;
use crate::session::{QueuedMessage, Session, SessionState};
use heapless::{Deque, Vec};
use log::{debug, warn};
use mqttsn_core::codec::{self, Message};
use mqttsn_core::config::{
    self, MAX_CLIENTID_LEN, MAX_NUM_CLIENTS, MAX_PAYLOAD_LEN, MAX_QUEUED_PUBLISH,
    MAX_TOPICNAME_LEN, MAX_TOPIC_MAPPINGS,
};
use mqttsn_core::flags::{flag_clean_session, flag_is_retain, flag_qos_level, flags_set, TOPIC_ID_TYPE_NORMAL};
use mqttsn_core::{Address, Device, RecvOutcome, TickOutcome, Transport};

/// MQTT-SN gateway engine. Generic over the host-supplied [`Device`] and
/// [`Transport`], and over an optional upstream [`MqttBridge`] `B`
/// (defaults to [`NoBridge`], so a non-bridging gateway needs no extra
/// type parameter). `SESS_CAP`/`MAP_CAP`/`MSG_CAP` bound the session
/// table, the shared mapping table and the max frame size.
pub struct Gateway<
    D,
    T,
    B = NoBridge,
    const SESS_CAP: usize = { MAX_NUM_CLIENTS },
    const MAP_CAP: usize = { MAX_TOPIC_MAPPINGS },
    const MSG_CAP: usize = { config::MAX_MSG_LEN },
> {
    device: D,
    transport: T,
    bridge: Option<B>,
    bridge_was_connected: bool,
    gw_id: u8,
    sessions: Vec<Session<MSG_CAP>, SESS_CAP>,
    mapping: MappingTable<MAP_CAP>,
    fifo: Deque<QueuedMessage, MAX_QUEUED_PUBLISH>,
    topic_prefix: heapless::String<MAX_TOPICNAME_LEN>,
    advertise_interval_ms: u32,
    advertise_timer: u32,
}

impl<D: Device, T: Transport, B: MqttBridge, const SESS_CAP: usize, const MAP_CAP: usize, const MSG_CAP: usize>
    Gateway<D, T, B, SESS_CAP, MAP_CAP, MSG_CAP>
{
    pub fn new(device: D, transport: T) -> Self {
        Gateway {
            device,
            transport,
            bridge: None,
            bridge_was_connected: false,
            gw_id: 0,
            sessions: Vec::new(),
            mapping: MappingTable::new(),
            fifo: Deque::new(),
            topic_prefix: heapless::String::new(),
            advertise_interval_ms: 15 * 60 * 1000,
            advertise_timer: 0,
        }
    }

    /// Validates and stores `gw_id` (must be non-zero).
    pub fn begin(&mut self, gw_id: u8) -> bool {
        if gw_id == 0 {
            warn!("gateway id 0 is reserved");
            return false;
        }
        self.gw_id = gw_id;
        true
    }

    pub fn with_bridge(mut self, bridge: B) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// `prefix/name` is composed for every topic relayed upstream; empty
    /// clears it. Returns `false` if `prefix` doesn't fit.
    pub fn set_topic_prefix(&mut self, prefix: &str) -> bool {
        match heapless::String::try_from(prefix) {
            Ok(s) => {
                self.topic_prefix = s;
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_advertise_interval_s(&mut self, seconds: u16) {
        self.advertise_interval_ms = u32::from(seconds) * 1000;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn find_session(&self, client_id: &str) -> Option<&Session<MSG_CAP>> {
        self.sessions.iter().find(|s| s.client_id.as_str() == client_id)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn bridge(&self) -> Option<&B> {
        self.bridge.as_ref()
    }

    pub fn bridge_mut(&mut self) -> Option<&mut B> {
        self.bridge.as_mut()
    }

    /// One engine tick: drains ingress, ages sessions, drains sleeping and
    /// global queues, advertises, and polls the bridge.
    pub fn poll(&mut self) {
        self.handle_messages();
        self.check_sessions();
        self.drain_awake_sessions();
        self.drain_fifo();
        self.advertise_tick();
        self.bridge_tick();
    }

    fn handle_messages(&mut self) {
        loop {
            let mut buf = [0u8; MSG_CAP];
            match self.transport.recv(&mut buf) {
                RecvOutcome::Empty => return,
                RecvOutcome::TooSmall => continue,
                RecvOutcome::Packet { bytes, from } => {
                    match codec::decode(bytes) {
                        Ok(msg) => self.dispatch(msg, &from),
                        Err(_) => debug!("dropping malformed frame from {from}"),
                    }
                    self.device.yield_now();
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Message, from: &Address) {
        match msg {
            Message::SearchGw { .. } => self.handle_searchgw(),
            Message::Connect { flags, duration, client_id } => {
                self.handle_connect(flags, duration, client_id, from)
            }
            Message::Register { msg_id, topic_name, .. } => self.handle_register(msg_id, topic_name, from),
            Message::Publish { flags, topic_id, msg_id, data } => {
                self.handle_publish(flags, topic_id, msg_id, data, from)
            }
            Message::Subscribe { flags, msg_id, topic_name } => {
                self.handle_subscribe(flags, msg_id, topic_name, from)
            }
            Message::Unsubscribe { msg_id, topic_name, .. } => {
                self.handle_unsubscribe(msg_id, topic_name, from)
            }
            Message::PingReq { client_id } => self.handle_pingreq(client_id, from),
            Message::Disconnect { duration } => self.handle_disconnect(duration, from),
            _ => {}
        }
    }

    fn session_index_by_addr(&self, addr: &Address) -> Option<usize> {
        self.sessions.iter().position(|s| &s.addr == addr)
    }

    fn reply(&mut self, to: &Address, msg: &Message) {
        let mut buf = [0u8; MSG_CAP];
        if let Ok(n) = codec::encode(msg, &mut buf) {
            self.transport.send(&buf[..n], to);
        }
    }

    fn broadcast(&mut self, msg: &Message) {
        let mut buf = [0u8; MSG_CAP];
        if let Ok(n) = codec::encode(msg, &mut buf) {
            self.transport.broadcast(&buf[..n]);
        }
    }

    fn handle_searchgw(&mut self) {
        self.broadcast(&Message::GwInfo { gw_id: self.gw_id, gw_addr: None });
    }

    fn handle_connect(&mut self, flags: u8, duration: u16, client_id: &str, from: &Address) {
        if client_id.is_empty() || client_id.len() > MAX_CLIENTID_LEN {
            return;
        }
        let mut i = 0;
        while i < self.sessions.len() {
            if self.sessions[i].client_id.as_str() == client_id || &self.sessions[i].addr == from {
                self.sessions.swap_remove(i);
            } else {
                i += 1;
            }
        }
        let keepalive_ms = u32::from(duration) * 1000;
        let mut session = Session::new(client_id, from.clone(), keepalive_ms, flag_clean_session(flags));
        session.last_in = self.device.now_ms();
        if self.sessions.push(session).is_err() {
            self.reply(from, &Message::ConnAck { return_code: codec::RC_CONGESTION });
            return;
        }
        self.reply(from, &Message::ConnAck { return_code: codec::RC_ACCEPTED });
    }

    fn handle_register(&mut self, msg_id: u16, topic_name: &str, from: &Address) {
        let Some(sidx) = self.session_index_by_addr(from) else { return };
        let now = self.device.now_ms();
        let Some(tid) = self.mapping.allocate(topic_name) else {
            self.reply(from, &Message::RegAck { topic_id: 0, msg_id, return_code: codec::RC_CONGESTION });
            return;
        };
        if !self.sessions[sidx].add_pub_topic(tid) {
            self.reply(from, &Message::RegAck { topic_id: tid, msg_id, return_code: codec::RC_CONGESTION });
            return;
        }
        self.sessions[sidx].last_in = now;
        self.reply(from, &Message::RegAck { topic_id: tid, msg_id, return_code: codec::RC_ACCEPTED });
    }

    /// QoS 0 only (spec.md Non-goals). Bridged and connected replaces
    /// local fan-out entirely; otherwise queues for sessions that
    /// subscribe, dropping silently if none do.
    fn handle_publish(&mut self, flags: u8, topic_id: u16, msg_id: u16, data: &[u8], from: &Address) {
        if msg_id != 0 {
            return;
        }
        let Some(sidx) = self.session_index_by_addr(from) else { return };
        self.sessions[sidx].last_in = self.device.now_ms();
        let Some(midx) = self.mapping.find_by_id(topic_id) else { return };
        let qos = flag_qos_level(flags);
        let retain = flag_is_retain(flags);

        if self.bridge.as_ref().map(MqttBridge::is_connected).unwrap_or(false) {
            let name = self.mapping.get(midx).expect("just found").name.clone();
            let composed = compose_upstream(self.topic_prefix.as_str(), name.as_str());
            if let (Some(composed), Some(bridge)) = (composed, self.bridge.as_mut()) {
                bridge.publish(composed.as_str(), data, qos, retain);
            }
            return;
        }
        if !self.sessions.iter().any(|s| s.subscription(topic_id).is_some()) {
            return;
        }
        let Ok(owned) = heapless::Vec::<u8, MAX_PAYLOAD_LEN>::from_slice(data) else { return };
        if self.fifo.push_back(QueuedMessage { tid: topic_id, qos, retain, data: owned }).is_err() {
            debug!("global publish fifo full, dropping");
        }
    }

    fn handle_subscribe(&mut self, flags: u8, msg_id: u16, topic_name: &str, from: &Address) {
        let Some(sidx) = self.session_index_by_addr(from) else { return };
        let qos = flag_qos_level(flags);
        let Some(tid) = self.mapping.allocate(topic_name) else {
            self.reply(from, &Message::SubAck { flags: 0, topic_id: 0, msg_id, return_code: codec::RC_CONGESTION });
            return;
        };
        if !self.sessions[sidx].subscribe(tid, qos) {
            self.reply(from, &Message::SubAck { flags: 0, topic_id: tid, msg_id, return_code: codec::RC_CONGESTION });
            return;
        }
        self.sessions[sidx].last_in = self.device.now_ms();
        self.reply(from, &Message::SubAck { flags: 0, topic_id: tid, msg_id, return_code: codec::RC_ACCEPTED });

        let Some(midx) = self.mapping.find_by_id(tid) else { return };
        let (needs_subscribe, name) = {
            let m = self.mapping.get(midx).expect("just found");
            (!m.subbed || qos > m.sub_qos, m.name.clone())
        };
        if !needs_subscribe {
            return;
        }
        if let Some(m) = self.mapping.get_mut(midx) {
            m.subbed = true;
            m.sub_qos = m.sub_qos.max(qos);
        }
        if self.bridge.as_ref().map(MqttBridge::is_connected).unwrap_or(false) {
            let composed = compose_upstream(self.topic_prefix.as_str(), name.as_str());
            if let (Some(composed), Some(bridge)) = (composed, self.bridge.as_mut()) {
                bridge.subscribe(composed.as_str(), qos);
            }
        }
    }

    fn handle_unsubscribe(&mut self, msg_id: u16, topic_name: &str, from: &Address) {
        let Some(sidx) = self.session_index_by_addr(from) else { return };
        let Some(midx) = self.mapping.find_by_name(topic_name) else {
            self.reply(from, &Message::UnsubAck { msg_id });
            return;
        };
        let tid = self.mapping.get(midx).expect("just found").tid;
        self.sessions[sidx].unsubscribe(tid);
        self.sessions[sidx].last_in = self.device.now_ms();
        self.reply(from, &Message::UnsubAck { msg_id });

        if self.sessions.iter().any(|s| s.subscription(tid).is_some()) {
            return;
        }
        let name = self.mapping.get(midx).expect("just found").name.clone();
        if let Some(m) = self.mapping.get_mut(midx) {
            m.subbed = false;
        }
        if self.bridge.as_ref().map(MqttBridge::is_connected).unwrap_or(false) {
            let composed = compose_upstream(self.topic_prefix.as_str(), name.as_str());
            if let (Some(composed), Some(bridge)) = (composed, self.bridge.as_mut()) {
                bridge.unsubscribe(composed.as_str());
            }
        }
    }

    /// An empty payload is a heartbeat from the sender's own session; a
    /// named payload wakes a *sleeping* session of that name (spec.md §9
    /// open question 4 — scoped strictly to this handler, never consulted
    /// elsewhere for address resolution).
    fn handle_pingreq(&mut self, client_id: Option<&str>, from: &Address) {
        match client_id {
            None => {
                let Some(sidx) = self.session_index_by_addr(from) else { return };
                self.sessions[sidx].last_in = self.device.now_ms();
                self.reply(from, &Message::PingResp);
            }
            Some(name) => {
                let Some(sidx) = self.sessions.iter().position(|s| s.client_id.as_str() == name) else {
                    return;
                };
                if self.sessions[sidx].state == SessionState::Asleep {
                    self.sessions[sidx].state = SessionState::Awake;
                    self.sessions[sidx].last_in = self.device.now_ms();
                }
            }
        }
    }

    fn handle_disconnect(&mut self, duration: Option<u16>, from: &Address) {
        let Some(sidx) = self.session_index_by_addr(from) else { return };
        let now = self.device.now_ms();
        match duration {
            None => {
                self.sessions.swap_remove(sidx);
            }
            Some(seconds) => {
                let s = &mut self.sessions[sidx];
                s.keepalive_interval_ms = u32::from(seconds) * 1000;
                s.keepalive_timeout_ms = config::keepalive_timeout_ms(s.keepalive_interval_ms);
                s.state = SessionState::Asleep;
                s.last_in = now;
                s.sleepy_queue.clear();
            }
        }
        self.reply(from, &Message::Disconnect { duration: None });
    }

    /// Removes timed-out sessions and advances each live session's
    /// in-flight retry timer.
    fn check_sessions(&mut self) {
        let now = self.device.now_ms();
        let mut idx = 0;
        while idx < self.sessions.len() {
            if now.wrapping_sub(self.sessions[idx].last_in) > self.sessions[idx].keepalive_timeout_ms {
                warn!("session {} timed out", self.sessions[idx].client_id);
                self.sessions.swap_remove(idx);
                continue;
            }
            if !self.sessions[idx].in_flight.is_empty() {
                let addr = self.sessions[idx].addr.clone();
                match self.sessions[idx].in_flight.tick(now) {
                    TickOutcome::Idle => {}
                    TickOutcome::Retransmit(bytes) => {
                        self.transport.send(bytes, &addr);
                    }
                    TickOutcome::Lost => {
                        self.sessions.swap_remove(idx);
                        continue;
                    }
                }
            }
            idx += 1;
        }
    }

    /// Drains one buffered message per AWAKE session per tick; once a
    /// session's queue is empty it gets a PINGRESP and returns to ASLEEP
    /// (spec.md §4.6).
    fn drain_awake_sessions(&mut self) {
        for idx in 0..self.sessions.len() {
            if self.sessions[idx].state != SessionState::Awake {
                continue;
            }
            let addr = self.sessions[idx].addr.clone();
            match self.sessions[idx].sleepy_queue.pop_front() {
                Some(msg) => {
                    let flags = flags_set(false, msg.qos, msg.retain, false, false, TOPIC_ID_TYPE_NORMAL);
                    self.reply(
                        &addr,
                        &Message::Publish { flags, topic_id: msg.tid, msg_id: 0, data: &msg.data },
                    );
                }
                None => {
                    self.sessions[idx].state = SessionState::Asleep;
                    self.reply(&addr, &Message::PingResp);
                }
            }
        }
    }

    /// Fans every queued PUBLISH out to every subscribed session: direct
    /// delivery if live, the sleepy queue if ASLEEP (spec.md §4.5 step 4).
    fn drain_fifo(&mut self) {
        while let Some(item) = self.fifo.pop_front() {
            for idx in 0..self.sessions.len() {
                if self.sessions[idx].subscription(item.tid).is_none() {
                    continue;
                }
                match self.sessions[idx].state {
                    SessionState::Asleep => {
                        let data = heapless::Vec::from_slice(&item.data).unwrap_or_default();
                        self.sessions[idx].enqueue(QueuedMessage {
                            tid: item.tid,
                            qos: item.qos,
                            retain: item.retain,
                            data,
                        });
                    }
                    SessionState::Active | SessionState::Awake => {
                        let addr = self.sessions[idx].addr.clone();
                        let flags =
                            flags_set(false, item.qos, item.retain, false, false, TOPIC_ID_TYPE_NORMAL);
                        self.reply(
                            &addr,
                            &Message::Publish { flags, topic_id: item.tid, msg_id: 0, data: &item.data },
                        );
                    }
                }
            }
        }
    }

    fn advertise_tick(&mut self) {
        if self.gw_id == 0 {
            return;
        }
        let now = self.device.now_ms();
        if now.wrapping_sub(self.advertise_timer) < self.advertise_interval_ms {
            return;
        }
        self.advertise_timer = now;
        let duration_s = (self.advertise_interval_ms / 1000) as u16;
        self.broadcast(&Message::Advertise { gw_id: self.gw_id, duration: duration_s });
    }

    /// Polls the bridge's connect state and drains its inbound queue.
    /// On a false->true transition every mapping a live session still
    /// wants is re-subscribed upstream (spec.md §4.7 connect-state(true)).
    /// A true->false transition only clears the tracked flag: sessions
    /// are never dropped for a bridge outage.
    fn bridge_tick(&mut self) {
        let connected = match self.bridge.as_ref() {
            Some(b) => b.is_connected(),
            None => return,
        };
        if connected && !self.bridge_was_connected {
            self.resubscribe_upstream();
        }
        self.bridge_was_connected = connected;

        for _ in 0..MAX_QUEUED_PUBLISH {
            let incoming = match self.bridge.as_mut() {
                Some(b) => b.poll_incoming(),
                None => None,
            };
            let Some(msg) = incoming else { break };
            let name = strip_prefix(self.topic_prefix.as_str(), msg.topic.as_str());
            let Some(tid) = self.mapping.allocate(name) else { continue };
            let data = heapless::Vec::from_slice(&msg.data).unwrap_or_default();
            if self
                .fifo
                .push_back(QueuedMessage { tid, qos: msg.qos, retain: msg.retain, data })
                .is_err()
            {
                debug!("global publish fifo full, dropping bridged message");
            }
        }
    }

    fn resubscribe_upstream(&mut self) {
        for idx in 0..self.mapping.len() {
            let Some(mapping) = self.mapping.get(idx) else { continue };
            if mapping.is_empty_slot() || !mapping.subbed {
                continue;
            }
            let tid = mapping.tid;
            let name = mapping.name.clone();
            let qos = mapping.sub_qos;
            if !self.sessions.iter().any(|s| s.subscription(tid).is_some()) {
                if let Some(m) = self.mapping.get_mut(idx) {
                    m.subbed = false;
                }
                continue;
            }
            let composed = compose_upstream(self.topic_prefix.as_str(), name.as_str());
            if let (Some(composed), Some(bridge)) = (composed, self.bridge.as_mut()) {
                bridge.subscribe(composed.as_str(), qos);
            }
        }
    }
}
