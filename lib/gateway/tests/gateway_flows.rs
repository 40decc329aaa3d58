use mqttsn_core::codec::{decode, encode, Message};
use mqttsn_core::testsupport::{FakeDevice, FakeTransport};
use mqttsn_core::Address;
use mqttsn_gateway::{BridgeMessage, Gateway, MqttBridge, NoBridge, SessionState};

fn addr(byte: u8) -> Address {
    Address::from_slice(&[byte]).unwrap()
}

type Gw = Gateway<FakeDevice, FakeTransport, NoBridge, 4, 8, 32>;

fn new_gateway() -> Gw {
    let mut gw: Gw = Gateway::new(FakeDevice::new(3), FakeTransport::new());
    gw.begin(1);
    gw
}

fn connect(gw: &mut Gw, from: &Address, client_id: &str) {
    let mut buf = [0u8; 32];
    let n = encode(&Message::Connect { flags: 0, duration: 30, client_id }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], from);
    gw.poll();
}

fn subscribe(gw: &mut Gw, from: &Address, topic: &str) -> u16 {
    let mut buf = [0u8; 32];
    let n = encode(&Message::Subscribe { flags: 0, msg_id: 9, topic_name: topic }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], from);
    gw.poll();
    let sent = gw.transport().last_sent_to(from).unwrap();
    match decode(sent).unwrap() {
        Message::SubAck { topic_id, return_code, .. } => {
            assert_eq!(return_code, mqttsn_core::codec::RC_ACCEPTED);
            topic_id
        }
        other => panic!("expected SubAck, got {other:?}"),
    }
}

fn register(gw: &mut Gw, from: &Address, topic: &str) -> u16 {
    let mut buf = [0u8; 32];
    let n = encode(&Message::Register { topic_id: 0, msg_id: 5, topic_name: topic }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], from);
    gw.poll();
    let sent = gw.transport().last_sent_to(from).unwrap();
    match decode(sent).unwrap() {
        Message::RegAck { topic_id, return_code, .. } => {
            assert_eq!(return_code, mqttsn_core::codec::RC_ACCEPTED);
            topic_id
        }
        other => panic!("expected RegAck, got {other:?}"),
    }
}

fn publish(gw: &mut Gw, from: &Address, topic_id: u16, data: &[u8]) {
    let mut buf = [0u8; 32];
    let n = encode(&Message::Publish { flags: 0, topic_id, msg_id: 0, data }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], from);
    gw.poll();
}

#[test]
fn register_then_publish_fans_out_to_subscriber() {
    let mut gw = new_gateway();
    let publisher = addr(10);
    let subscriber = addr(20);

    connect(&mut gw, &publisher, "pub-1");
    let tid = register(&mut gw, &publisher, "sensors/a");

    connect(&mut gw, &subscriber, "sub-1");
    let sub_tid = subscribe(&mut gw, &subscriber, "sensors/a");
    assert_eq!(tid, sub_tid, "same name resolves to the same gateway-wide id");

    publish(&mut gw, &publisher, tid, b"42");

    let sent = gw.transport().last_sent_to(&subscriber).unwrap();
    match decode(sent).unwrap() {
        Message::Publish { topic_id, data, .. } => {
            assert_eq!(topic_id, tid);
            assert_eq!(data, b"42");
        }
        other => panic!("expected Publish, got {other:?}"),
    }
}

#[test]
fn connect_after_uptime_does_not_reap_the_new_session_on_the_same_tick() {
    let mut gw = new_gateway();
    // clock is already well past the default keepalive timeout before the
    // client ever connects.
    gw.device_mut().advance(120_000);
    let client = addr(10);

    connect(&mut gw, &client, "late-1");

    assert!(gw.find_session("late-1").is_some());
    assert_eq!(gw.session_count(), 1);
}

#[test]
fn publish_with_no_subscriber_is_dropped() {
    let mut gw = new_gateway();
    let publisher = addr(10);
    connect(&mut gw, &publisher, "pub-1");
    let tid = register(&mut gw, &publisher, "sensors/a");

    publish(&mut gw, &publisher, tid, b"lonely");

    for (bytes, _) in gw.transport().outbound.iter() {
        assert!(!matches!(decode(bytes).unwrap(), Message::Publish { .. }));
    }
}

#[test]
fn sleeping_client_buffers_then_drains_on_wake() {
    let mut gw = new_gateway();
    let publisher = addr(10);
    let subscriber = addr(20);

    connect(&mut gw, &subscriber, "sub-1");
    let tid = subscribe(&mut gw, &subscriber, "sensors/a");

    connect(&mut gw, &publisher, "pub-1");

    // subscriber goes to sleep for 60s.
    let mut buf = [0u8; 32];
    let n = encode(&Message::Disconnect { duration: Some(60) }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();
    assert_eq!(gw.find_session("sub-1").unwrap().state, SessionState::Asleep);

    publish(&mut gw, &publisher, tid, b"buffered");
    for (bytes, dest) in gw.transport().outbound.iter() {
        if dest == &subscriber {
            assert!(!matches!(decode(bytes).unwrap(), Message::Publish { .. }));
        }
    }

    // a named PINGREQ wakes the session; the engine drains the one
    // buffered message within the same tick it wakes.
    let n = encode(&Message::PingReq { client_id: Some("sub-1") }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();

    let sent = gw.transport().last_sent_to(&subscriber).unwrap();
    match decode(sent).unwrap() {
        Message::Publish { topic_id, data, .. } => {
            assert_eq!(topic_id, tid);
            assert_eq!(data, b"buffered");
        }
        other => panic!("expected the buffered Publish, got {other:?}"),
    }

    // queue is now empty: the next tick sends PINGRESP and the session
    // returns to ASLEEP.
    gw.poll();
    let sent = gw.transport().last_sent_to(&subscriber).unwrap();
    assert!(matches!(decode(sent).unwrap(), Message::PingResp));
    assert_eq!(gw.find_session("sub-1").unwrap().state, SessionState::Asleep);
}

struct FakeBridge {
    connected: bool,
    published: heapless::Vec<(heapless::String<32>, heapless::Vec<u8, 32>, u8, bool), 8>,
    subscribed: heapless::Vec<(heapless::String<32>, u8), 8>,
}

impl FakeBridge {
    fn new(connected: bool) -> Self {
        FakeBridge { connected, published: heapless::Vec::new(), subscribed: heapless::Vec::new() }
    }
}

impl MqttBridge for FakeBridge {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, data: &[u8], qos: u8, retain: bool) {
        let _ = self.published.push((
            heapless::String::try_from(topic).unwrap(),
            heapless::Vec::from_slice(data).unwrap(),
            qos,
            retain,
        ));
    }

    fn subscribe(&mut self, topic: &str, qos: u8) {
        let _ = self.subscribed.push((heapless::String::try_from(topic).unwrap(), qos));
    }

    fn unsubscribe(&mut self, _topic: &str) {}

    fn poll_incoming(&mut self) -> Option<BridgeMessage> {
        None
    }
}

type BridgedGw = Gateway<FakeDevice, FakeTransport, FakeBridge, 4, 8, 32>;

#[test]
fn subscribe_with_upstream_connected_subscribes_the_bridge() {
    let mut gw: BridgedGw =
        Gateway::new(FakeDevice::new(3), FakeTransport::new()).with_bridge(FakeBridge::new(true));
    gw.begin(1);
    let subscriber = addr(20);

    let mut buf = [0u8; 32];
    let n = encode(&Message::Connect { flags: 0, duration: 30, client_id: "sub-1" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();

    let n = encode(&Message::Subscribe { flags: 0, msg_id: 1, topic_name: "sensors/a" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();

    let subscribed = &gw.bridge().unwrap().subscribed;
    assert_eq!(subscribed.len(), 1);
    assert_eq!(subscribed[0].0.as_str(), "sensors/a");
    assert_eq!(subscribed[0].1, 0);
}

#[test]
fn bridged_publish_relays_upstream_and_skips_local_fanout() {
    let mut gw: BridgedGw =
        Gateway::new(FakeDevice::new(3), FakeTransport::new()).with_bridge(FakeBridge::new(true));
    gw.begin(1);
    let publisher = addr(10);
    let subscriber = addr(20);

    let mut buf = [0u8; 32];
    let n = encode(&Message::Connect { flags: 0, duration: 30, client_id: "sub-1" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();
    let n = encode(&Message::Subscribe { flags: 0, msg_id: 1, topic_name: "sensors/a" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &subscriber);
    gw.poll();
    let tid = match decode(gw.transport().last_sent_to(&subscriber).unwrap()).unwrap() {
        Message::SubAck { topic_id, .. } => topic_id,
        other => panic!("expected SubAck, got {other:?}"),
    };

    let n = encode(&Message::Connect { flags: 0, duration: 30, client_id: "pub-1" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &publisher);
    gw.poll();
    let n = encode(&Message::Publish { flags: 0, topic_id: tid, msg_id: 0, data: b"x" }, &mut buf).unwrap();
    gw.transport_mut().deliver(&buf[..n], &publisher);
    gw.poll();

    for (bytes, dest) in gw.transport().outbound.iter() {
        if dest == &subscriber {
            assert!(!matches!(decode(bytes).unwrap(), Message::Publish { .. }));
        }
    }

    let published = &gw.bridge().unwrap().published;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0.as_str(), "sensors/a");
    assert_eq!(published[0].1.as_slice(), b"x");
}
