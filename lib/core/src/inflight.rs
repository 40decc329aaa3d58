//! The single-unicast-in-flight primitive shared by the client and
//! gateway: replaces the reference implementation's raw byte buffer plus
//! re-parse-on-every-ACK with a typed value that remembers what reply it
//! is waiting for.

use crate::config::{N_RETRY, T_RETRY_MS};
use crate::error::{Error, Result};
use heapless::Vec;

/// What happened when a [`InFlight::tick`] ran.
pub enum TickOutcome<'a> {
    /// Nothing due yet.
    Idle,
    /// The retry timer elapsed; here is the frame to resend.
    Retransmit(&'a [u8]),
    /// Retries are exhausted (invariant #6: after `N_RETRY + 1`
    /// unacknowledged transmissions). The slot has been cleared.
    Lost,
}

/// At most one unacknowledged unicast message, per peer, at a time.
pub struct InFlight<const N: usize> {
    frame: Vec<u8, N>,
    expected_reply: u8,
    msg_id: u16,
    unicast_timer: u32,
    unicast_counter: u8,
}

impl<const N: usize> Default for InFlight<N> {
    fn default() -> Self {
        InFlight {
            frame: Vec::new(),
            expected_reply: 0,
            msg_id: 0,
            unicast_timer: 0,
            unicast_counter: 0,
        }
    }
}

impl<const N: usize> InFlight<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// Begins tracking `frame`, expecting a reply of type `expected_reply`
    /// matching `msg_id` (irrelevant, pass 0, for replies without one,
    /// e.g. CONNACK/PINGRESP).
    pub fn start(&mut self, frame: &[u8], expected_reply: u8, msg_id: u16, now: u32) -> Result<()> {
        if !self.frame.is_empty() {
            return Err(Error::Busy);
        }
        self.frame = Vec::from_slice(frame).map_err(|_| Error::BufferTooSmall)?;
        self.expected_reply = expected_reply;
        self.msg_id = msg_id;
        self.unicast_timer = now;
        self.unicast_counter = 0;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frame.clear();
        self.unicast_counter = 0;
    }

    /// Advances the retry timer. Must be called once per tick.
    pub fn tick(&mut self, now: u32) -> TickOutcome<'_> {
        if self.frame.is_empty() {
            return TickOutcome::Idle;
        }
        if now.wrapping_sub(self.unicast_timer) < T_RETRY_MS {
            return TickOutcome::Idle;
        }
        self.unicast_timer = now;
        self.unicast_counter += 1;
        if self.unicast_counter > N_RETRY {
            self.clear();
            return TickOutcome::Lost;
        }
        TickOutcome::Retransmit(&self.frame)
    }

    /// Checks whether an inbound `(msg_type, msg_id)` matches the pending
    /// transaction, without clearing it. `msg_id` is ignored (the match
    /// succeeds on type alone) when `None` is passed, for replies that
    /// carry no id of their own (CONNACK, PINGRESP).
    pub fn matches(&self, msg_type: u8, msg_id: Option<u16>) -> bool {
        if self.frame.is_empty() || self.expected_reply != msg_type {
            return false;
        }
        if let Some(id) = msg_id {
            if id != self.msg_id {
                return false;
            }
        }
        true
    }

    /// [`Self::matches`], then clears the slot if it did.
    pub fn complete_if_matches(&mut self, msg_type: u8, msg_id: Option<u16>) -> bool {
        if !self.matches(msg_type, msg_id) {
            return false;
        }
        self.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retransmits_then_is_lost_after_n_retry_plus_one_sends() {
        let mut slot: InFlight<16> = InFlight::new();
        slot.start(&[1, 2, 3], 0x05, 0, 0).unwrap();

        // original send at t=0, then N_RETRY retransmissions.
        for i in 1..=u32::from(N_RETRY) {
            match slot.tick(i * T_RETRY_MS) {
                TickOutcome::Retransmit(bytes) => assert_eq!(bytes, &[1, 2, 3]),
                _ => panic!("expected retransmit on attempt {i}"),
            }
        }
        match slot.tick((u32::from(N_RETRY) + 1) * T_RETRY_MS) {
            TickOutcome::Lost => {}
            _ => panic!("expected Lost after N_RETRY+1 sends"),
        }
        assert!(slot.is_empty());
    }

    #[test]
    fn matching_reply_clears_the_slot() {
        let mut slot: InFlight<16> = InFlight::new();
        slot.start(&[1, 2, 3], 0x0B, 42, 0).unwrap();
        assert!(!slot.complete_if_matches(0x0B, Some(43)));
        assert!(slot.complete_if_matches(0x0B, Some(42)));
        assert!(slot.is_empty());
    }

    #[test]
    fn busy_rejects_a_second_start() {
        let mut slot: InFlight<16> = InFlight::new();
        slot.start(&[1], 0x05, 0, 0).unwrap();
        assert_eq!(slot.start(&[2], 0x05, 0, 0), Err(Error::Busy));
    }
}
