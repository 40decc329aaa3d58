//! Wire codec for the MQTT-SN v1.2 message subset this engine supports.
//!
//! `Frame` is `{length:u8, msg_type:u8, payload...}`, `length` counting
//! itself. The long (3-byte) length prefix (`length == 1`) is rejected:
//! this engine never emits or accepts frames over 255 bytes.
//!
//! Variable-length fields borrow from the input buffer on decode, so a
//! decoded [`Message`] never allocates; callers that must retain one past
//! the buffer's lifetime (the in-flight store) copy it into a
//! fixed-capacity buffer themselves.

use crate::error::{Error, Result};

pub const MSG_TYPE_ADVERTISE: u8 = 0x00;
pub const MSG_TYPE_SEARCHGW: u8 = 0x01;
pub const MSG_TYPE_GWINFO: u8 = 0x02;
pub const MSG_TYPE_CONNECT: u8 = 0x04;
pub const MSG_TYPE_CONNACK: u8 = 0x05;
pub const MSG_TYPE_REGISTER: u8 = 0x0A;
pub const MSG_TYPE_REGACK: u8 = 0x0B;
pub const MSG_TYPE_PUBLISH: u8 = 0x0C;
pub const MSG_TYPE_PUBACK: u8 = 0x0D;
pub const MSG_TYPE_SUBSCRIBE: u8 = 0x12;
pub const MSG_TYPE_SUBACK: u8 = 0x13;
pub const MSG_TYPE_UNSUBSCRIBE: u8 = 0x14;
pub const MSG_TYPE_UNSUBACK: u8 = 0x15;
pub const MSG_TYPE_PINGREQ: u8 = 0x16;
pub const MSG_TYPE_PINGRESP: u8 = 0x17;
pub const MSG_TYPE_DISCONNECT: u8 = 0x18;

pub const PROTOCOL_ID: u8 = 0x01;

pub const RC_ACCEPTED: u8 = 0;
pub const RC_CONGESTION: u8 = 1;
pub const RC_INVALID_TOPIC_ID: u8 = 2;
pub const RC_NOT_SUPPORTED: u8 = 3;

/// A decoded MQTT-SN message. Lifetime `'a` ties variable-length fields to
/// the buffer they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Advertise { gw_id: u8, duration: u16 },
    SearchGw { radius: u8 },
    GwInfo { gw_id: u8, gw_addr: Option<&'a [u8]> },
    Connect { flags: u8, duration: u16, client_id: &'a str },
    ConnAck { return_code: u8 },
    Register { topic_id: u16, msg_id: u16, topic_name: &'a str },
    RegAck { topic_id: u16, msg_id: u16, return_code: u8 },
    Publish { flags: u8, topic_id: u16, msg_id: u16, data: &'a [u8] },
    PubAck { topic_id: u16, msg_id: u16, return_code: u8 },
    Subscribe { flags: u8, msg_id: u16, topic_name: &'a str },
    SubAck { flags: u8, topic_id: u16, msg_id: u16, return_code: u8 },
    Unsubscribe { flags: u8, msg_id: u16, topic_name: &'a str },
    UnsubAck { msg_id: u16 },
    PingReq { client_id: Option<&'a str> },
    PingResp,
    Disconnect { duration: Option<u16> },
}

impl<'a> Message<'a> {
    /// The message type byte this variant encodes to / was decoded from.
    pub fn msg_type(&self) -> u8 {
        match self {
            Message::Advertise { .. } => MSG_TYPE_ADVERTISE,
            Message::SearchGw { .. } => MSG_TYPE_SEARCHGW,
            Message::GwInfo { .. } => MSG_TYPE_GWINFO,
            Message::Connect { .. } => MSG_TYPE_CONNECT,
            Message::ConnAck { .. } => MSG_TYPE_CONNACK,
            Message::Register { .. } => MSG_TYPE_REGISTER,
            Message::RegAck { .. } => MSG_TYPE_REGACK,
            Message::Publish { .. } => MSG_TYPE_PUBLISH,
            Message::PubAck { .. } => MSG_TYPE_PUBACK,
            Message::Subscribe { .. } => MSG_TYPE_SUBSCRIBE,
            Message::SubAck { .. } => MSG_TYPE_SUBACK,
            Message::Unsubscribe { .. } => MSG_TYPE_UNSUBSCRIBE,
            Message::UnsubAck { .. } => MSG_TYPE_UNSUBACK,
            Message::PingReq { .. } => MSG_TYPE_PINGREQ,
            Message::PingResp => MSG_TYPE_PINGRESP,
            Message::Disconnect { .. } => MSG_TYPE_DISCONNECT,
        }
    }

    /// Does this message's msg_id field participate in matching (i.e. is
    /// it meaningful, non-zero-reserved, matchable against an in-flight
    /// request)? PUBLISH at QoS 0 carries `msg_id == 0` and is excluded.
    pub fn msg_id(&self) -> Option<u16> {
        match *self {
            Message::Register { msg_id, .. }
            | Message::RegAck { msg_id, .. }
            | Message::Subscribe { msg_id, .. }
            | Message::SubAck { msg_id, .. }
            | Message::Unsubscribe { msg_id, .. }
            | Message::UnsubAck { msg_id } => Some(msg_id),
            _ => None,
        }
    }
}

fn put_u16(out: &mut [u8], at: usize, v: u16) {
    out[at] = (v >> 8) as u8;
    out[at + 1] = v as u8;
}

fn get_u16(buf: &[u8], at: usize) -> u16 {
    ((buf[at] as u16) << 8) | (buf[at + 1] as u16)
}

/// Encodes `msg` into `out`, returning the number of bytes written
/// (the total frame length, including the 2-byte header).
///
/// Returns [`Error::BufferTooSmall`] if `out` can't hold the frame, or if
/// the frame would exceed 255 bytes.
pub fn encode(msg: &Message, out: &mut [u8]) -> Result<usize> {
    let body_len = match msg {
        Message::Advertise { .. } => 3,
        Message::SearchGw { .. } => 1,
        Message::GwInfo { gw_addr, .. } => 1 + gw_addr.map_or(0, |a| a.len()),
        Message::Connect { client_id, .. } => 4 + client_id.len(),
        Message::ConnAck { .. } => 1,
        Message::Register { topic_name, .. } => 4 + topic_name.len(),
        Message::RegAck { .. } => 5,
        Message::Publish { data, .. } => 5 + data.len(),
        Message::PubAck { .. } => 5,
        Message::Subscribe { topic_name, .. } => 3 + topic_name.len(),
        Message::SubAck { .. } => 6,
        Message::Unsubscribe { topic_name, .. } => 3 + topic_name.len(),
        Message::UnsubAck { .. } => 2,
        Message::PingReq { client_id } => client_id.map_or(0, |c| c.len()),
        Message::PingResp => 0,
        Message::Disconnect { duration } => duration.map_or(0, |_| 2),
    };
    let total_len = 2 + body_len;
    if total_len > 255 || total_len > out.len() {
        return Err(Error::BufferTooSmall);
    }
    out[0] = total_len as u8;
    out[1] = msg.msg_type();
    let body = &mut out[2..total_len];
    match msg {
        Message::Advertise { gw_id, duration } => {
            body[0] = *gw_id;
            put_u16(body, 1, *duration);
        }
        Message::SearchGw { radius } => body[0] = *radius,
        Message::GwInfo { gw_id, gw_addr } => {
            body[0] = *gw_id;
            if let Some(addr) = gw_addr {
                body[1..1 + addr.len()].copy_from_slice(addr);
            }
        }
        Message::Connect { flags, duration, client_id } => {
            body[0] = *flags;
            body[1] = PROTOCOL_ID;
            put_u16(body, 2, *duration);
            body[4..4 + client_id.len()].copy_from_slice(client_id.as_bytes());
        }
        Message::ConnAck { return_code } => body[0] = *return_code,
        Message::Register { topic_id, msg_id, topic_name } => {
            put_u16(body, 0, *topic_id);
            put_u16(body, 2, *msg_id);
            body[4..4 + topic_name.len()].copy_from_slice(topic_name.as_bytes());
        }
        Message::RegAck { topic_id, msg_id, return_code } => {
            put_u16(body, 0, *topic_id);
            put_u16(body, 2, *msg_id);
            body[4] = *return_code;
        }
        Message::Publish { flags, topic_id, msg_id, data } => {
            body[0] = *flags;
            put_u16(body, 1, *topic_id);
            put_u16(body, 3, *msg_id);
            body[5..5 + data.len()].copy_from_slice(data);
        }
        Message::PubAck { topic_id, msg_id, return_code } => {
            put_u16(body, 0, *topic_id);
            put_u16(body, 2, *msg_id);
            body[4] = *return_code;
        }
        Message::Subscribe { flags, msg_id, topic_name } => {
            body[0] = *flags;
            put_u16(body, 1, *msg_id);
            body[3..3 + topic_name.len()].copy_from_slice(topic_name.as_bytes());
        }
        Message::SubAck { flags, topic_id, msg_id, return_code } => {
            body[0] = *flags;
            put_u16(body, 1, *topic_id);
            put_u16(body, 3, *msg_id);
            body[5] = *return_code;
        }
        Message::Unsubscribe { flags, msg_id, topic_name } => {
            body[0] = *flags;
            put_u16(body, 1, *msg_id);
            body[3..3 + topic_name.len()].copy_from_slice(topic_name.as_bytes());
        }
        Message::UnsubAck { msg_id } => put_u16(body, 0, *msg_id),
        Message::PingReq { client_id } => {
            if let Some(c) = client_id {
                body[..c.len()].copy_from_slice(c.as_bytes());
            }
        }
        Message::PingResp => {}
        Message::Disconnect { duration } => {
            if let Some(d) = duration {
                put_u16(body, 0, *d);
            }
        }
    }
    Ok(total_len)
}

/// Decodes a single frame from `buf`. `buf` must contain exactly one
/// frame (`buf[0]` is its total length; trailing bytes are ignored by the
/// caller's framing, not by this function).
pub fn decode(buf: &[u8]) -> Result<Message<'_>> {
    if buf.len() < 2 {
        return Err(Error::MalformedFrame);
    }
    let len = buf[0];
    if len == 1 {
        // long length prefix: unsupported, reject.
        return Err(Error::MalformedFrame);
    }
    let len = len as usize;
    if len < 2 || len > buf.len() {
        return Err(Error::MalformedFrame);
    }
    let msg_type = buf[1];
    let body = &buf[2..len];

    let str_field = |b: &'_ [u8]| -> Result<&'_ str> {
        core::str::from_utf8(b).map_err(|_| Error::MalformedFrame)
    };

    Ok(match msg_type {
        MSG_TYPE_ADVERTISE => {
            if body.len() != 3 {
                return Err(Error::MalformedFrame);
            }
            Message::Advertise { gw_id: body[0], duration: get_u16(body, 1) }
        }
        MSG_TYPE_SEARCHGW => {
            if body.len() != 1 {
                return Err(Error::MalformedFrame);
            }
            Message::SearchGw { radius: body[0] }
        }
        MSG_TYPE_GWINFO => {
            if body.is_empty() {
                return Err(Error::MalformedFrame);
            }
            let gw_addr = if body.len() > 1 { Some(&body[1..]) } else { None };
            Message::GwInfo { gw_id: body[0], gw_addr }
        }
        MSG_TYPE_CONNECT => {
            if body.len() < 4 {
                return Err(Error::MalformedFrame);
            }
            Message::Connect {
                flags: body[0],
                duration: get_u16(body, 2),
                client_id: str_field(&body[4..])?,
            }
        }
        MSG_TYPE_CONNACK => {
            if body.len() != 1 {
                return Err(Error::MalformedFrame);
            }
            Message::ConnAck { return_code: body[0] }
        }
        MSG_TYPE_REGISTER => {
            if body.len() < 4 {
                return Err(Error::MalformedFrame);
            }
            Message::Register {
                topic_id: get_u16(body, 0),
                msg_id: get_u16(body, 2),
                topic_name: str_field(&body[4..])?,
            }
        }
        MSG_TYPE_REGACK => {
            if body.len() != 5 {
                return Err(Error::MalformedFrame);
            }
            Message::RegAck {
                topic_id: get_u16(body, 0),
                msg_id: get_u16(body, 2),
                return_code: body[4],
            }
        }
        MSG_TYPE_PUBLISH => {
            if body.len() < 5 {
                return Err(Error::MalformedFrame);
            }
            Message::Publish {
                flags: body[0],
                topic_id: get_u16(body, 1),
                msg_id: get_u16(body, 3),
                data: &body[5..],
            }
        }
        MSG_TYPE_PUBACK => {
            if body.len() != 5 {
                return Err(Error::MalformedFrame);
            }
            Message::PubAck {
                topic_id: get_u16(body, 0),
                msg_id: get_u16(body, 2),
                return_code: body[4],
            }
        }
        MSG_TYPE_SUBSCRIBE => {
            if body.len() < 3 {
                return Err(Error::MalformedFrame);
            }
            Message::Subscribe {
                flags: body[0],
                msg_id: get_u16(body, 1),
                topic_name: str_field(&body[3..])?,
            }
        }
        MSG_TYPE_SUBACK => {
            if body.len() != 6 {
                return Err(Error::MalformedFrame);
            }
            Message::SubAck {
                flags: body[0],
                topic_id: get_u16(body, 1),
                msg_id: get_u16(body, 3),
                return_code: body[5],
            }
        }
        MSG_TYPE_UNSUBSCRIBE => {
            if body.len() < 3 {
                return Err(Error::MalformedFrame);
            }
            Message::Unsubscribe {
                flags: body[0],
                msg_id: get_u16(body, 1),
                topic_name: str_field(&body[3..])?,
            }
        }
        MSG_TYPE_UNSUBACK => {
            if body.len() != 2 {
                return Err(Error::MalformedFrame);
            }
            Message::UnsubAck { msg_id: get_u16(body, 0) }
        }
        MSG_TYPE_PINGREQ => Message::PingReq {
            client_id: if body.is_empty() { None } else { Some(str_field(body)?) },
        },
        MSG_TYPE_PINGRESP => {
            if !body.is_empty() {
                return Err(Error::MalformedFrame);
            }
            Message::PingResp
        }
        MSG_TYPE_DISCONNECT => match body.len() {
            0 => Message::Disconnect { duration: None },
            2 => Message::Disconnect { duration: Some(get_u16(body, 0)) },
            _ => return Err(Error::MalformedFrame),
        },
        _ => return Err(Error::MalformedFrame),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: Message) {
        let mut buf = [0u8; 64];
        let n = encode(&msg, &mut buf).expect("encode");
        let decoded = decode(&buf[..n]).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn round_trips_every_kind() {
        round_trip(Message::Advertise { gw_id: 7, duration: 900 });
        round_trip(Message::SearchGw { radius: 0 });
        round_trip(Message::GwInfo { gw_id: 7, gw_addr: Some(&[0x0A]) });
        round_trip(Message::GwInfo { gw_id: 7, gw_addr: None });
        round_trip(Message::Connect { flags: 0, duration: 30, client_id: "sensor-1" });
        round_trip(Message::ConnAck { return_code: RC_ACCEPTED });
        round_trip(Message::Register { topic_id: 0, msg_id: 1, topic_name: "sensors/a" });
        round_trip(Message::RegAck { topic_id: 1, msg_id: 1, return_code: RC_ACCEPTED });
        round_trip(Message::Publish { flags: 0, topic_id: 1, msg_id: 0, data: &[0xAB, 0xCD] });
        round_trip(Message::PubAck { topic_id: 1, msg_id: 0, return_code: RC_ACCEPTED });
        round_trip(Message::Subscribe { flags: 0, msg_id: 2, topic_name: "x" });
        round_trip(Message::SubAck { flags: 0, topic_id: 1, msg_id: 2, return_code: RC_ACCEPTED });
        round_trip(Message::Unsubscribe { flags: 0, msg_id: 3, topic_name: "x" });
        round_trip(Message::UnsubAck { msg_id: 3 });
        round_trip(Message::PingReq { client_id: None });
        round_trip(Message::PingReq { client_id: Some("sensor-1") });
        round_trip(Message::PingResp);
        round_trip(Message::Disconnect { duration: None });
        round_trip(Message::Disconnect { duration: Some(60) });
    }

    #[test]
    fn rejects_long_length_prefix() {
        let buf = [1u8, 0, 10, MSG_TYPE_PUBLISH];
        assert_eq!(decode(&buf), Err(Error::MalformedFrame));
    }

    #[test]
    fn rejects_unknown_type() {
        let buf = [3u8, 0xFE, 0];
        assert_eq!(decode(&buf), Err(Error::MalformedFrame));
    }

    #[test]
    fn rejects_truncated_body() {
        // REGACK declares 5 body bytes but only 2 are present.
        let buf = [4u8, MSG_TYPE_REGACK, 0, 1];
        assert_eq!(decode(&buf), Err(Error::MalformedFrame));
    }

    #[test]
    fn encode_rejects_buffer_too_small() {
        let msg = Message::PingResp;
        let mut tiny = [0u8; 1];
        assert_eq!(encode(&msg, &mut tiny), Err(Error::BufferTooSmall));
    }
}
