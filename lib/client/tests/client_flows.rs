use mqttsn_client::{Client, State};
use mqttsn_core::codec::{encode, Message};
use mqttsn_core::config::{N_RETRY, T_RETRY_MS};
use mqttsn_core::testsupport::{FakeDevice, FakeTransport};
use mqttsn_core::Address;

fn addr(byte: u8) -> Address {
    Address::from_slice(&[byte]).unwrap()
}

fn new_client<'cb>() -> Client<'cb, FakeDevice, FakeTransport, 4, 32> {
    Client::new(FakeDevice::new(7), FakeTransport::new())
}

fn sent_to<'cb>(client: &Client<'cb, FakeDevice, FakeTransport, 4, 32>, dest: &Address) -> usize {
    client.transport().outbound.iter().filter(|(_, a)| a == dest).count()
}

#[test]
fn discovery_resets_backoff_on_peer_searchgw() {
    let mut client = new_client();
    client.begin("sensor-1");
    client.start_discovery();
    assert_eq!(client.status(), State::Searching);
    let interval = client.searchgw_interval_ms();

    let peer = addr(9);
    let mut buf = [0u8; 32];
    let n = encode(&Message::SearchGw { radius: 0 }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &peer);
    client.poll();
    assert!(client.transport().broadcasts.is_empty());

    client.device_mut().advance(interval - 1);
    client.poll();
    assert!(
        client.transport().broadcasts.is_empty(),
        "must not broadcast before the (reset) interval elapses"
    );

    client.device_mut().advance(1);
    client.poll();
    assert_eq!(client.transport().broadcasts.len(), 1);
}

#[test]
fn gwinfo_cancels_pending_and_returns_to_disconnected() {
    let mut client = new_client();
    client.begin("sensor-1");
    client.start_discovery();

    let mut buf = [0u8; 32];
    let n = encode(&Message::GwInfo { gw_id: 5, gw_addr: Some(&[1, 2, 3]) }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &addr(200));

    client.poll();
    assert_eq!(client.gateway_count(), 1);
    assert_eq!(client.status(), State::Disconnected);
}

#[test]
fn connect_retransmits_n_retry_times_then_attempts_a_fresh_gateway() {
    let mut client = new_client();
    client.begin("sensor-1");
    let gw = addr(42);
    client.add_gateways(&[(3, gw.clone())]);

    assert!(client.connect(3, None, 30));
    assert_eq!(client.status(), State::Connecting);
    assert_eq!(sent_to(&client, &gw), 1);

    for i in 1..=u32::from(N_RETRY) {
        client.device_mut().advance(T_RETRY_MS);
        client.poll();
        assert_eq!(sent_to(&client, &gw), 1 + i as usize, "retry {i}");
        assert_eq!(client.status(), State::Connecting);
    }

    // one more interval exhausts the retries: the slot is declared lost
    // and the engine immediately retries connect() against whatever
    // gateway is available (here, the same one).
    client.device_mut().advance(T_RETRY_MS);
    client.poll();
    assert_eq!(sent_to(&client, &gw), 1 + N_RETRY as usize + 1);
    assert_eq!(client.status(), State::Connecting);
}

#[test]
fn connack_accepted_activates_and_clears_topic_ids() {
    let mut client = new_client();
    client.begin("sensor-1");
    let gw = addr(1);
    client.add_gateways(&[(1, gw.clone())]);
    assert!(client.connect(1, None, 30));

    let mut buf = [0u8; 32];
    let n = encode(&Message::ConnAck { return_code: mqttsn_core::codec::RC_ACCEPTED }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.poll();

    assert!(client.is_connected());
    assert_eq!(client.status(), State::Active);
}

#[test]
fn register_then_publish_round_trip() {
    let mut client = new_client();
    client.begin("sensor-1");
    let gw = addr(1);
    client.add_gateways(&[(1, gw.clone())]);
    client.connect(1, None, 30);
    let mut buf = [0u8; 32];
    let n = encode(&Message::ConnAck { return_code: mqttsn_core::codec::RC_ACCEPTED }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.poll();
    assert!(client.is_connected());

    assert!(!client.register_topics(&["sensors/a"]));
    let sent = client.transport().last_sent_to(&gw).unwrap().to_vec();
    let decoded = mqttsn_core::codec::decode(&sent).unwrap();
    let msg_id = match decoded {
        Message::Register { msg_id, topic_name, .. } => {
            assert_eq!(topic_name, "sensors/a");
            msg_id
        }
        other => panic!("expected Register, got {other:?}"),
    };

    let n = encode(
        &Message::RegAck { topic_id: 11, msg_id, return_code: mqttsn_core::codec::RC_ACCEPTED },
        &mut buf,
    )
    .unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    assert!(client.register_topics(&["sensors/a"]));

    assert!(client.publish("sensors/a", b"42", None));
    let sent = client.transport().last_sent_to(&gw).unwrap();
    match mqttsn_core::codec::decode(sent).unwrap() {
        Message::Publish { topic_id, msg_id, data, .. } => {
            assert_eq!(topic_id, 11);
            assert_eq!(msg_id, 0);
            assert_eq!(data, b"42");
        }
        other => panic!("expected Publish, got {other:?}"),
    }

    // publish on an unregistered name is rejected.
    assert!(!client.publish("sensors/b", b"x", None));
}

#[test]
fn inbound_publish_resolves_against_the_subscribe_list() {
    let mut client = new_client();
    client.begin("sensor-1");
    let gw = addr(1);
    client.add_gateways(&[(1, gw.clone())]);
    client.connect(1, None, 30);
    let mut buf = [0u8; 32];
    let n = encode(&Message::ConnAck { return_code: mqttsn_core::codec::RC_ACCEPTED }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.poll();

    client.subscribe_topics(&[("alerts", 0)]);
    let sent = client.transport().last_sent_to(&gw).unwrap().to_vec();
    let msg_id = match mqttsn_core::codec::decode(&sent).unwrap() {
        Message::Subscribe { msg_id, topic_name, .. } => {
            assert_eq!(topic_name, "alerts");
            msg_id
        }
        other => panic!("expected Subscribe, got {other:?}"),
    };
    let n = encode(
        &Message::SubAck { flags: 0, topic_id: 77, msg_id, return_code: mqttsn_core::codec::RC_ACCEPTED },
        &mut buf,
    )
    .unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.subscribe_topics(&[("alerts", 0)]);

    let mut received: Option<(heapless::String<23>, heapless::Vec<u8, 8>)> = None;
    let mut cb = |name: &str, data: &[u8], _flags: u8| {
        received = Some((
            heapless::String::try_from(name).unwrap(),
            heapless::Vec::from_slice(data).unwrap(),
        ));
    };
    client.on_message(&mut cb);

    let n = encode(&Message::Publish { flags: 0, topic_id: 77, msg_id: 0, data: b"cold" }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.poll();

    let (name, data) = received.expect("callback fired");
    assert_eq!(name.as_str(), "alerts");
    assert_eq!(data.as_slice(), b"cold");
}

#[test]
fn active_keepalive_pings_then_declares_the_gateway_lost() {
    let mut client = new_client();
    client.begin("sensor-1");
    let gw = addr(1);
    client.add_gateways(&[(1, gw.clone())]);
    client.connect(1, None, 30);
    let mut buf = [0u8; 32];
    let n = encode(&Message::ConnAck { return_code: mqttsn_core::codec::RC_ACCEPTED }, &mut buf).unwrap();
    client.transport_mut().deliver(&buf[..n], &gw);
    client.poll();
    assert_eq!(client.status(), State::Active);

    // 30s keepalive => 30000ms interval, 45000ms timeout (interval*1.5).
    client.device_mut().advance(30_000);
    client.poll();
    let pings_before = sent_to(&client, &gw);
    assert!(pings_before >= 1, "expected a PINGREQ once the interval elapsed");

    client.device_mut().advance(45_000);
    client.poll();
    assert_eq!(client.status(), State::Lost);
    assert!(!client.is_connected());
}
