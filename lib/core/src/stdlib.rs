//! Reference `Device`/`Transport` impls over `std::net`/`std::time`, for
//! local testing and binaries that don't target an embedded host. Not
//! used by the engine itself; a caller opts in via the `std` feature.

use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use crate::address::Address;
use crate::device::Device;
use crate::transport::{RecvOutcome, Transport};

/// `Device` backed by a monotonic [`Instant`] and a seeded xorshift32,
/// matching [`crate::testsupport::FakeDevice`]'s generator so timing
/// tests and production runs share the same distribution shape.
pub struct StdDevice {
    epoch: Instant,
    rng_state: u32,
}

impl StdDevice {
    pub fn new(seed: u32) -> Self {
        StdDevice { epoch: Instant::now(), rng_state: seed | 1 }
    }
}

impl Device for StdDevice {
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn random(&mut self, min: u32, max: u32) -> u32 {
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

    fn yield_now(&mut self) {
        std::thread::yield_now();
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

/// Encodes a [`SocketAddr`] into the engine's opaque [`Address`]: 4 bytes
/// of IPv4 plus a 2-byte big-endian port. IPv6 peers are not supported
/// (this reference transport is for local testing, not production).
fn encode_addr(addr: SocketAddr) -> Option<Address> {
    match addr {
        SocketAddr::V4(v4) => {
            let ip = v4.ip().octets();
            let port = v4.port().to_be_bytes();
            Address::from_slice(&[ip[0], ip[1], ip[2], ip[3], port[0], port[1]])
        }
        SocketAddr::V6(_) => None,
    }
}

fn decode_addr(addr: &Address) -> Option<SocketAddr> {
    let b = addr.as_slice();
    if b.len() != 6 {
        return None;
    }
    let ip = std::net::Ipv4Addr::new(b[0], b[1], b[2], b[3]);
    let port = u16::from_be_bytes([b[4], b[5]]);
    Some(SocketAddr::from((ip, port)))
}

/// `Transport` over a non-blocking UDP socket. `broadcast` requires the
/// socket to have `SO_BROADCAST` set and a configured broadcast address.
pub struct UdpTransport {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
}

impl UdpTransport {
    pub fn bind(local: SocketAddr, broadcast_addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        if broadcast_addr.ip().is_broadcast() || matches!(broadcast_addr.ip(), std::net::IpAddr::V4(ip) if ip.octets()[3] == 255) {
            socket.set_broadcast(true)?;
        }
        Ok(UdpTransport { socket, broadcast_addr })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, bytes: &[u8], dest: &Address) -> u8 {
        let Some(addr) = decode_addr(dest) else { return 0 };
        self.socket.send_to(bytes, addr).map(|n| n as u8).unwrap_or(0)
    }

    fn recv<'a>(&mut self, buf: &'a mut [u8]) -> RecvOutcome<'a> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => match encode_addr(from) {
                Some(addr) => RecvOutcome::Packet { bytes: &buf[..n], from: addr },
                None => RecvOutcome::Empty,
            },
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => RecvOutcome::Empty,
            Err(_) => RecvOutcome::Empty,
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) -> u8 {
        self.socket.send_to(bytes, self.broadcast_addr).map(|n| n as u8).unwrap_or(0)
    }
}
