//! Deterministic `Device`/`Transport` fakes shared by this crate's own
//! tests and the client/gateway crates' integration suites. Gated behind
//! the `test-util` feature rather than `#[cfg(test)]` so it's visible
//! across crate boundaries.

use crate::address::Address;
use crate::device::Device;
use crate::transport::{RecvOutcome, Transport};
use heapless::Deque;

/// A settable clock and a seeded linear-congruential generator, good
/// enough to make discovery back-off and retry timing deterministic in
/// tests without pulling in `rand`.
pub struct FakeDevice {
    now: u32,
    rng_state: u32,
}

impl FakeDevice {
    pub fn new(seed: u32) -> Self {
        FakeDevice { now: 0, rng_state: seed | 1 }
    }

    pub fn advance(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(ms);
    }

    pub fn set(&mut self, now: u32) {
        self.now = now;
    }
}

impl Device for FakeDevice {
    fn now_ms(&self) -> u32 {
        self.now
    }

    fn random(&mut self, min: u32, max: u32) -> u32 {
        // xorshift32
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng_state = x;
        if max <= min {
            return min;
        }
        min + (x % (max - min))
    }

    fn yield_now(&mut self) {}

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms);
    }
}

const QUEUE_CAP: usize = 32;

struct Packet {
    bytes: heapless::Vec<u8, 64>,
    addr: Address,
}

/// An in-memory pair of packet queues: `inbound` is drained by `recv`,
/// `outbound`/`broadcasts` record what the engine under test sent so
/// assertions can inspect them.
#[derive(Default)]
pub struct FakeTransport {
    inbound: Deque<Packet, QUEUE_CAP>,
    pub outbound: heapless::Vec<(heapless::Vec<u8, 64>, Address), QUEUE_CAP>,
    pub broadcasts: heapless::Vec<heapless::Vec<u8, 64>, QUEUE_CAP>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a packet as if it had arrived from `from`.
    pub fn deliver(&mut self, bytes: &[u8], from: &Address) {
        let _ = self.inbound.push_back(Packet {
            bytes: heapless::Vec::from_slice(bytes).expect("test packet fits"),
            addr: from.clone(),
        });
    }

    pub fn last_sent_to(&self, dest: &Address) -> Option<&[u8]> {
        self.outbound.iter().rev().find(|(_, a)| a == dest).map(|(b, _)| b.as_slice())
    }
}

impl Transport for FakeTransport {
    fn send(&mut self, bytes: &[u8], dest: &Address) -> u8 {
        let v = heapless::Vec::from_slice(bytes).expect("test packet fits");
        let len = bytes.len() as u8;
        let _ = self.outbound.push((v, dest.clone()));
        len
    }

    fn recv<'a>(&mut self, buf: &'a mut [u8]) -> RecvOutcome<'a> {
        match self.inbound.pop_front() {
            None => RecvOutcome::Empty,
            Some(pkt) => {
                if pkt.bytes.len() > buf.len() {
                    return RecvOutcome::TooSmall;
                }
                let n = pkt.bytes.len();
                buf[..n].copy_from_slice(&pkt.bytes);
                RecvOutcome::Packet { bytes: &buf[..n], from: pkt.addr }
            }
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) -> u8 {
        let v = heapless::Vec::from_slice(bytes).expect("test packet fits");
        let len = bytes.len() as u8;
        let _ = self.broadcasts.push(v);
        len
    }
}
