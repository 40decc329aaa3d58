use crate::gateway_table::GatewayTable;
use crate::state::State;
use heapless::Vec;
use log::{debug, trace, warn};
use mqttsn_core::codec::{self, Message};
use mqttsn_core::config::{
    self, MAX_CLIENTID_LEN, MAX_INSTANCE_TOPICS, MAX_T_SEARCHGW_MS, T_RETRY_MS, T_SEARCHGW_MS,
};
use mqttsn_core::flags::{flag_dup, flag_is_retain, flags_set, QOS_LEVEL_0, TOPIC_ID_TYPE_NORMAL};
use mqttsn_core::{Address, Device, InFlight, PubTopic, RecvOutcome, SubTopic, TickOutcome, Transport};

/// A registered publish callback: borrowed rather than boxed, so no
/// allocator is required to use it.
pub type PublishCallback<'cb> = &'cb mut dyn FnMut(&str, &[u8], u8);

/// MQTT-SN client engine. Generic over the host-supplied [`Device`] and
/// [`Transport`]; `GW_CAP` bounds the number of known gateways, `MSG_CAP`
/// the max frame size (defaults match spec.md §6).
pub struct Client<'cb, D, T, const GW_CAP: usize = 4, const MSG_CAP: usize = { config::MAX_MSG_LEN }>
{
    device: D,
    transport: T,
    client_id: heapless::String<MAX_CLIENTID_LEN>,
    gateways: GatewayTable<GW_CAP>,
    pub_topics: Vec<PubTopic, MAX_INSTANCE_TOPICS>,
    sub_topics: Vec<SubTopic, MAX_INSTANCE_TOPICS>,
    state: State,
    curr_gateway: Option<usize>,
    connect_flags: u8,
    connected: bool,
    inflight: InFlight<MSG_CAP>,
    /// Set just before a REGISTER/SUBSCRIBE/UNSUBSCRIBE is put in flight,
    /// so the matching ack can be resolved to its topic-list entry
    /// without re-parsing the saved request (see SPEC_FULL.md §4.2).
    pending_topic: Option<usize>,
    keepalive_interval_ms: u32,
    keepalive_timeout_ms: u32,
    last_in: u32,
    last_out: u32,
    pingresp_pending: bool,
    pingreq_timer: u32,
    gwinfo_timer: u32,
    gwinfo_pending: bool,
    searchgw_interval_ms: u32,
    curr_msg_id: u16,
    publish_cb: Option<PublishCallback<'cb>>,
}

impl<'cb, D: Device, T: Transport, const GW_CAP: usize, const MSG_CAP: usize>
    Client<'cb, D, T, GW_CAP, MSG_CAP>
{
    pub fn new(device: D, transport: T) -> Self {
        Client {
            device,
            transport,
            client_id: heapless::String::new(),
            gateways: GatewayTable::new(),
            pub_topics: Vec::new(),
            sub_topics: Vec::new(),
            state: State::default(),
            curr_gateway: None,
            connect_flags: 0,
            connected: false,
            inflight: InFlight::new(),
            pending_topic: None,
            keepalive_interval_ms: u32::from(config::DEFAULT_KEEPALIVE_S) * 1000,
            keepalive_timeout_ms: config::keepalive_timeout_ms(
                u32::from(config::DEFAULT_KEEPALIVE_S) * 1000,
            ),
            last_in: 0,
            last_out: 0,
            pingresp_pending: false,
            pingreq_timer: 0,
            gwinfo_timer: 0,
            gwinfo_pending: false,
            searchgw_interval_ms: T_SEARCHGW_MS,
            curr_msg_id: 0,
            publish_cb: None,
        }
    }

    /// Validates and stores `client_id` (1..=23 bytes).
    pub fn begin(&mut self, client_id: &str) -> bool {
        if client_id.is_empty() || client_id.len() > MAX_CLIENTID_LEN {
            warn!("invalid client id (len={})", client_id.len());
            return false;
        }
        self.client_id = heapless::String::try_from(client_id).expect("length checked above");
        true
    }

    /// Pre-seeds known gateways (e.g. statically provisioned), marking
    /// them available. Returns `false` if the table is full.
    pub fn add_gateways(&mut self, known: &[(u8, Address)]) -> bool {
        let mut all_ok = true;
        for (gw_id, addr) in known {
            all_ok &= self.gateways.insert(*gw_id, addr.clone());
        }
        all_ok
    }

    pub fn gateway_count(&self) -> u8 {
        self.gateways.count() as u8
    }

    pub fn status(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_message(&mut self, cb: PublishCallback<'cb>) {
        self.publish_cb = Some(cb);
    }

    /// Current randomized SEARCHGW back-off, milliseconds.
    pub fn searchgw_interval_ms(&self) -> u32 {
        self.searchgw_interval_ms
    }

    /// Read access to the host-supplied [`Device`], for monitoring or tests.
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Read access to the host-supplied [`Transport`], for monitoring or tests.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn start_discovery(&mut self) {
        if self.gwinfo_pending {
            return;
        }
        let now = self.device.now_ms();
        self.gwinfo_timer = now;
        self.gwinfo_pending = true;
        self.searchgw_interval_ms = self.device.random(0, T_SEARCHGW_MS);
        self.state = State::Searching;
        debug!("starting SEARCHGW delay of {} ms", self.searchgw_interval_ms);
    }

    pub fn connect(&mut self, gw_id: u8, flags: Option<u8>, duration_s: u16) -> bool {
        if !self.inflight.is_empty() {
            return false;
        }
        let Some(idx) = self.gateways.select(gw_id) else {
            return false;
        };
        let flags = flags.unwrap_or(0);
        self.connect_flags = flags;
        self.keepalive_interval_ms = u32::from(duration_s) * 1000;
        self.keepalive_timeout_ms = config::keepalive_timeout_ms(self.keepalive_interval_ms);

        let mut buf = [0u8; MSG_CAP];
        let msg = Message::Connect { flags, duration: duration_s, client_id: &self.client_id };
        let Ok(n) = codec::encode(&msg, &mut buf) else {
            return false;
        };
        let addr = self.gateways.get(idx).expect("just selected").gw_addr.clone();
        self.transport.send(&buf[..n], &addr);
        let now = self.device.now_ms();
        if self.inflight.start(&buf[..n], codec::MSG_TYPE_CONNACK, 0, now).is_err() {
            return false;
        }
        self.curr_gateway = Some(idx);
        self.connected = false;
        self.state = State::Connecting;
        self.last_out = now;
        true
    }

    /// Ensures every name in `names` is tracked, then drives one
    /// outstanding REGISTER at a time until all are assigned a topic id.
    /// Returns `true` once every tracked topic has an id.
    pub fn register_topics(&mut self, names: &[&str]) -> bool {
        for name in names {
            if !self.pub_topics.iter().any(|t| t.name.as_str() == *name) {
                if let Some(pt) = PubTopic::new(name) {
                    let _ = self.pub_topics.push(pt);
                }
            }
        }
        if !self.connected || !self.inflight.is_empty() {
            return false;
        }
        for i in 0..self.pub_topics.len() {
            if !self.pub_topics[i].is_registered() {
                self.send_register(i);
                return false;
            }
        }
        true
    }

    fn send_register(&mut self, idx: usize) {
        let Some(addr) = self.curr_gateway_addr() else { return };
        let msg_id = self.next_msg_id();
        let mut buf = [0u8; MSG_CAP];
        let msg = Message::Register { topic_id: 0, msg_id, topic_name: &self.pub_topics[idx].name };
        let Ok(n) = codec::encode(&msg, &mut buf) else { return };
        self.transport.send(&buf[..n], &addr);
        let now = self.device.now_ms();
        if self.inflight.start(&buf[..n], codec::MSG_TYPE_REGACK, msg_id, now).is_ok() {
            self.pending_topic = Some(idx);
            self.last_out = now;
        }
    }

    /// Publishes QoS 0 data on an already-registered topic. `flags`'
    /// `dup`/`retain` bits are honored; its `qos` bits are ignored (this
    /// engine never delivers QoS 1/2, see spec.md Non-goals).
    pub fn publish(&mut self, name: &str, data: &[u8], flags: Option<u8>) -> bool {
        if !self.connected {
            return false;
        }
        let Some(topic_id) = self
            .pub_topics
            .iter()
            .find(|t| t.name.as_str() == name)
            .map(|t| t.tid)
            .filter(|tid| *tid != config::TOPIC_NOTASSIGNED)
        else {
            return false;
        };
        let Some(addr) = self.curr_gateway_addr() else { return false };
        let raw = flags.unwrap_or(0);
        let out_flags =
            flags_set(flag_dup(raw), QOS_LEVEL_0, flag_is_retain(raw), false, false, TOPIC_ID_TYPE_NORMAL);
        let mut buf = [0u8; MSG_CAP];
        let msg = Message::Publish { flags: out_flags, topic_id, msg_id: 0, data };
        let Ok(n) = codec::encode(&msg, &mut buf) else { return false };
        self.transport.send(&buf[..n], &addr);
        self.last_out = self.device.now_ms();
        true
    }

    pub fn subscribe_topics(&mut self, topics: &[(&str, u8)]) -> bool {
        for (name, qos) in topics {
            if !self.sub_topics.iter().any(|t| t.name.as_str() == *name) {
                let flags = flags_set(false, *qos, false, false, false, TOPIC_ID_TYPE_NORMAL);
                if let Some(st) = SubTopic::new(name, flags) {
                    let _ = self.sub_topics.push(st);
                }
            }
        }
        if !self.connected || !self.inflight.is_empty() {
            return false;
        }
        for i in 0..self.sub_topics.len() {
            if self.sub_topics[i].is_pending() {
                self.send_subscribe(i);
                return false;
            }
        }
        true
    }

    fn send_subscribe(&mut self, idx: usize) {
        let Some(addr) = self.curr_gateway_addr() else { return };
        let msg_id = self.next_msg_id();
        let mut buf = [0u8; MSG_CAP];
        let msg = Message::Subscribe {
            flags: self.sub_topics[idx].flags,
            msg_id,
            topic_name: &self.sub_topics[idx].name,
        };
        let Ok(n) = codec::encode(&msg, &mut buf) else { return };
        self.transport.send(&buf[..n], &addr);
        let now = self.device.now_ms();
        if self.inflight.start(&buf[..n], codec::MSG_TYPE_SUBACK, msg_id, now).is_ok() {
            self.pending_topic = Some(idx);
            self.last_out = now;
        }
    }

    pub fn unsubscribe(&mut self, name: &str, flags: Option<u8>) -> bool {
        if !self.connected || !self.inflight.is_empty() {
            return false;
        }
        let Some(addr) = self.curr_gateway_addr() else { return false };
        let Some(idx) = self.sub_topics.iter().position(|t| t.name.as_str() == name) else {
            return false;
        };
        let msg_id = self.next_msg_id();
        let mut buf = [0u8; MSG_CAP];
        let msg =
            Message::Unsubscribe { flags: flags.unwrap_or(0), msg_id, topic_name: &self.sub_topics[idx].name };
        let Ok(n) = codec::encode(&msg, &mut buf) else { return false };
        self.transport.send(&buf[..n], &addr);
        let now = self.device.now_ms();
        if self.inflight.start(&buf[..n], codec::MSG_TYPE_UNSUBACK, msg_id, now).is_err() {
            return false;
        }
        self.pending_topic = Some(idx);
        self.last_out = now;
        true
    }

    pub fn ping(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        let Some(addr) = self.curr_gateway_addr() else { return false };
        let mut buf = [0u8; MSG_CAP];
        let msg = Message::PingReq { client_id: None };
        let Ok(n) = codec::encode(&msg, &mut buf) else { return false };
        self.transport.send(&buf[..n], &addr);
        let now = self.device.now_ms();
        self.last_out = now;
        self.pingreq_timer = now;
        true
    }

    pub fn disconnect(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        if let Some(addr) = self.curr_gateway_addr() {
            let mut buf = [0u8; MSG_CAP];
            let msg = Message::Disconnect { duration: None };
            if let Ok(n) = codec::encode(&msg, &mut buf) {
                self.transport.send(&buf[..n], &addr);
            }
        }
        self.connected = false;
        self.state = State::Disconnected;
        true
    }

    pub fn transaction_pending(&mut self) -> bool {
        if self.inflight.is_empty() {
            return false;
        }
        self.poll();
        !self.inflight.is_empty()
    }

    /// One engine tick: drains ingress, advances the retry timer, then
    /// runs the current state's handler. Returns `true` iff `ACTIVE`.
    /// (named `poll`, not `loop`, a reserved word in Rust)
    pub fn poll(&mut self) -> bool {
        self.handle_messages();
        self.inflight_tick();
        match self.state {
            State::Searching => self.searching_handler(),
            State::Connecting => self.connecting_handler(),
            State::Active => self.active_handler(),
            State::Lost => self.lost_handler(),
            State::Disconnected | State::Asleep | State::Awake => {}
        }
        self.state == State::Active
    }

    fn curr_gateway_addr(&self) -> Option<Address> {
        self.curr_gateway.and_then(|idx| self.gateways.get(idx)).map(|g| g.gw_addr.clone())
    }

    fn is_from_curr_gateway(&self, from: &Address) -> bool {
        self.curr_gateway
            .and_then(|idx| self.gateways.get(idx))
            .map(|g| &g.gw_addr == from)
            .unwrap_or(false)
    }

    fn next_msg_id(&mut self) -> u16 {
        if self.curr_msg_id == 0 {
            self.curr_msg_id = 1;
        }
        let id = self.curr_msg_id;
        self.curr_msg_id = if self.curr_msg_id == u16::MAX { 1 } else { self.curr_msg_id + 1 };
        id
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
                        Err(_) => trace!("dropping malformed frame from {from}"),
                    }
                    self.device.yield_now();
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Message, from: &Address) {
        match msg {
            Message::Advertise { gw_id, .. } => self.handle_advertise(gw_id, from),
            Message::SearchGw { .. } => self.handle_searchgw(),
            Message::GwInfo { gw_id, gw_addr } => self.handle_gwinfo(gw_id, gw_addr, from),
            Message::ConnAck { return_code } => self.handle_connack(return_code, from),
            Message::RegAck { topic_id, msg_id, return_code } => {
                self.handle_regack(topic_id, msg_id, return_code, from)
            }
            Message::Publish { flags, topic_id, msg_id, data } => {
                self.handle_publish(flags, topic_id, msg_id, data, from)
            }
            Message::SubAck { topic_id, msg_id, return_code, .. } => {
                self.handle_suback(topic_id, msg_id, return_code, from)
            }
            Message::UnsubAck { msg_id } => self.handle_unsuback(msg_id, from),
            Message::PingResp => self.handle_pingresp(from),
            _ => {}
        }
    }

    fn handle_advertise(&mut self, gw_id: u8, from: &Address) {
        if self.gateways.find_by_id(gw_id).is_some() {
            return;
        }
        self.gateways.insert(gw_id, from.clone());
    }

    fn handle_searchgw(&mut self) {
        if self.gwinfo_pending {
            self.gwinfo_timer = self.device.now_ms();
        }
    }

    fn handle_gwinfo(&mut self, gw_id: u8, gw_addr: Option<&[u8]>, from: &Address) {
        if self.gateways.find_by_id(gw_id).is_some() {
            self.gwinfo_pending = false;
            return;
        }
        let addr = gw_addr.and_then(Address::from_slice).unwrap_or_else(|| from.clone());
        self.gateways.insert(gw_id, addr);
        self.gwinfo_pending = false;
    }

    fn handle_connack(&mut self, return_code: u8, from: &Address) {
        if !self.is_from_curr_gateway(from) {
            return;
        }
        if !self.inflight.matches(codec::MSG_TYPE_CONNACK, None) {
            return;
        }
        self.inflight.clear();
        if return_code != codec::RC_ACCEPTED {
            self.state = State::Disconnected;
            return;
        }
        self.connected = true;
        self.pingresp_pending = false;
        self.last_in = self.device.now_ms();
        for t in self.pub_topics.iter_mut() {
            t.tid = config::TOPIC_NOTASSIGNED;
        }
        for t in self.sub_topics.iter_mut() {
            t.tid = config::TOPIC_NOTASSIGNED;
        }
    }

    fn handle_regack(&mut self, topic_id: u16, msg_id: u16, return_code: u8, from: &Address) {
        if !self.is_from_curr_gateway(from) {
            return;
        }
        if !self.inflight.matches(codec::MSG_TYPE_REGACK, Some(msg_id)) {
            return;
        }
        if return_code != codec::RC_ACCEPTED {
            // left pending: will retry/time out like any other unacked request.
            return;
        }
        self.inflight.clear();
        if let Some(idx) = self.pending_topic.take() {
            if let Some(t) = self.pub_topics.get_mut(idx) {
                t.tid = topic_id;
            }
        }
        self.last_in = self.device.now_ms();
    }

    fn handle_suback(&mut self, topic_id: u16, msg_id: u16, return_code: u8, from: &Address) {
        if !self.is_from_curr_gateway(from) {
            return;
        }
        if !self.inflight.matches(codec::MSG_TYPE_SUBACK, Some(msg_id)) {
            return;
        }
        if return_code != codec::RC_ACCEPTED {
            return;
        }
        self.inflight.clear();
        if let Some(idx) = self.pending_topic.take() {
            if let Some(t) = self.sub_topics.get_mut(idx) {
                t.tid = topic_id;
            }
        }
        self.last_in = self.device.now_ms();
    }

    fn handle_unsuback(&mut self, msg_id: u16, from: &Address) {
        if !self.is_from_curr_gateway(from) {
            return;
        }
        if !self.inflight.matches(codec::MSG_TYPE_UNSUBACK, Some(msg_id)) {
            return;
        }
        self.inflight.clear();
        if let Some(idx) = self.pending_topic.take() {
            if let Some(t) = self.sub_topics.get_mut(idx) {
                t.tid = config::TOPIC_UNSUBSCRIBED;
            }
        }
        self.last_in = self.device.now_ms();
    }

    /// Resolved against the *subscribe* list (spec.md §9 open question 3 —
    /// one reference copy incorrectly resolved against the publish list).
    fn handle_publish(&mut self, flags: u8, topic_id: u16, msg_id: u16, data: &[u8], from: &Address) {
        if self.curr_gateway.is_none() || !self.connected || msg_id != 0 {
            return;
        }
        if !self.is_from_curr_gateway(from) {
            return;
        }
        let Some(name) = self.sub_topics.iter().find(|t| t.tid == topic_id).map(|t| t.name.clone())
        else {
            return;
        };
        if let Some(cb) = self.publish_cb.as_mut() {
            cb(name.as_str(), data, flags);
        }
    }

    fn handle_pingresp(&mut self, from: &Address) {
        if !self.is_from_curr_gateway(from) {
            return;
        }
        if !self.pingresp_pending {
            return;
        }
        self.pingresp_pending = false;
        self.last_in = self.device.now_ms();
    }

    fn searching_handler(&mut self) {
        if !self.gwinfo_pending {
            self.state = State::Disconnected;
            return;
        }
        let now = self.device.now_ms();
        if now.wrapping_sub(self.gwinfo_timer) >= self.searchgw_interval_ms {
            let mut buf = [0u8; MSG_CAP];
            let msg = Message::SearchGw { radius: 0 };
            if let Ok(n) = codec::encode(&msg, &mut buf) {
                self.transport.broadcast(&buf[..n]);
            }
            self.gwinfo_timer = now;
            self.searchgw_interval_ms = if self.searchgw_interval_ms < MAX_T_SEARCHGW_MS {
                self.searchgw_interval_ms.saturating_mul(2).min(MAX_T_SEARCHGW_MS)
            } else {
                MAX_T_SEARCHGW_MS
            };
        }
    }

    fn connecting_handler(&mut self) {
        if self.connected {
            self.state = State::Active;
        }
    }

    fn lost_handler(&mut self) {
        warn!("gateway lost, attempting reconnect");
        let flags = self.connect_flags;
        let duration_s = (self.keepalive_interval_ms / 1000) as u16;
        self.connect(0, Some(flags), duration_s);
    }

    fn active_handler(&mut self) {
        let now = self.device.now_ms();
        if now.wrapping_sub(self.last_out) < self.keepalive_interval_ms
            || now.wrapping_sub(self.last_in) < self.keepalive_interval_ms
        {
            return;
        }
        if !self.pingresp_pending {
            self.ping();
            self.pingresp_pending = true;
            return;
        }
        if now.wrapping_sub(self.pingreq_timer) < T_RETRY_MS {
            return;
        }
        if now.wrapping_sub(self.last_in) >= self.keepalive_timeout_ms {
            self.state = State::Lost;
            if let Some(idx) = self.curr_gateway {
                if let Some(g) = self.gateways.get_mut(idx) {
                    g.available = false;
                }
            }
            self.curr_gateway = None;
            self.connected = false;
            self.pingresp_pending = false;
        } else {
            self.ping();
            self.pingresp_pending = true;
        }
    }

    fn inflight_tick(&mut self) {
        let now = self.device.now_ms();
        let Some(idx) = self.curr_gateway else {
            return;
        };
        match self.inflight.tick(now) {
            TickOutcome::Idle => {}
            TickOutcome::Retransmit(bytes) => {
                if let Some(addr) = self.gateways.get(idx).map(|g| g.gw_addr.clone()) {
                    self.transport.send(bytes, &addr);
                }
            }
            TickOutcome::Lost => {
                self.connected = false;
                self.state = State::Lost;
                if let Some(g) = self.gateways.get_mut(idx) {
                    g.available = false;
                }
                self.curr_gateway = None;
                self.pending_topic = None;
            }
        }
    }
}
