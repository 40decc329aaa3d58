//! The single-byte MQTT-SN flags field: `dup(1) qos(2) retain(1) will(1)
//! clean_session(1) topicid_type(2)`, MSB to LSB.

pub const QOS_LEVEL_0: u8 = 0;
pub const QOS_LEVEL_1: u8 = 1;
pub const QOS_LEVEL_2: u8 = 2;
pub const QOS_LEVEL_3: u8 = 3; // reserved, -1 in the MQTT-SN spec

pub const TOPIC_ID_TYPE_NORMAL: u8 = 0b00;
pub const TOPIC_ID_TYPE_PRE_DEFINED: u8 = 0b01;
pub const TOPIC_ID_TYPE_SHORT: u8 = 0b10;
pub const TOPIC_ID_TYPE_RESERVED: u8 = 0b11;

const DUP_SHIFT: u8 = 7;
const QOS_SHIFT: u8 = 5;
const RETAIN_SHIFT: u8 = 4;
const WILL_SHIFT: u8 = 3;
const CLEAN_SESSION_SHIFT: u8 = 2;
const TOPIC_ID_TYPE_SHIFT: u8 = 0;

/// Packs the individual flag fields into the wire byte.
#[allow(clippy::too_many_arguments)]
pub fn flags_set(
    dup: bool,
    qos: u8,
    retain: bool,
    will: bool,
    clean_session: bool,
    topicid_type: u8,
) -> u8 {
    ((dup as u8) << DUP_SHIFT)
        | ((qos & 0b11) << QOS_SHIFT)
        | ((retain as u8) << RETAIN_SHIFT)
        | ((will as u8) << WILL_SHIFT)
        | ((clean_session as u8) << CLEAN_SESSION_SHIFT)
        | ((topicid_type & 0b11) << TOPIC_ID_TYPE_SHIFT)
}

pub fn flag_dup(flags: u8) -> bool {
    (flags >> DUP_SHIFT) & 1 != 0
}

pub fn flag_qos_level(flags: u8) -> u8 {
    (flags >> QOS_SHIFT) & 0b11
}

pub fn flag_is_retain(flags: u8) -> bool {
    (flags >> RETAIN_SHIFT) & 1 != 0
}

pub fn flag_will(flags: u8) -> bool {
    (flags >> WILL_SHIFT) & 1 != 0
}

pub fn flag_clean_session(flags: u8) -> bool {
    (flags >> CLEAN_SESSION_SHIFT) & 1 != 0
}

pub fn flag_topic_id_type(flags: u8) -> u8 {
    (flags >> TOPIC_ID_TYPE_SHIFT) & 0b11
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_each_field() {
        let flags = flags_set(true, QOS_LEVEL_1, true, false, true, TOPIC_ID_TYPE_SHORT);
        assert!(flag_dup(flags));
        assert_eq!(flag_qos_level(flags), QOS_LEVEL_1);
        assert!(flag_is_retain(flags));
        assert!(!flag_will(flags));
        assert!(flag_clean_session(flags));
        assert_eq!(flag_topic_id_type(flags), TOPIC_ID_TYPE_SHORT);
    }
}
