use crate::config::{MAX_TOPICNAME_LEN, TOPIC_NOTASSIGNED, TOPIC_UNSUBSCRIBED};
use heapless::String;

pub type TopicName = String<MAX_TOPICNAME_LEN>;

/// A client-side publish topic. `tid == 0` until a REGACK assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubTopic {
    pub name: TopicName,
    pub tid: u16,
}

impl PubTopic {
    pub fn new(name: &str) -> Option<Self> {
        Some(PubTopic { name: TopicName::try_from(name).ok()?, tid: TOPIC_NOTASSIGNED })
    }

    pub fn is_registered(&self) -> bool {
        self.tid != TOPIC_NOTASSIGNED
    }
}

/// A client-side subscribe topic. `tid == 0xFFFF` is the tombstone left
/// behind by an UNSUBACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTopic {
    pub name: TopicName,
    pub flags: u8,
    pub tid: u16,
}

impl SubTopic {
    pub fn new(name: &str, flags: u8) -> Option<Self> {
        Some(SubTopic { name: TopicName::try_from(name).ok()?, flags, tid: TOPIC_NOTASSIGNED })
    }

    pub fn is_registered(&self) -> bool {
        self.tid != TOPIC_NOTASSIGNED && self.tid != TOPIC_UNSUBSCRIBED
    }

    pub fn is_pending(&self) -> bool {
        self.tid == TOPIC_NOTASSIGNED
    }
}

/// A gateway-side name<->id mapping, shared across all sessions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicMapping {
    pub name: TopicName,
    pub tid: u16,
    pub subbed: bool,
    pub sub_qos: u8,
}

impl TopicMapping {
    pub fn is_empty_slot(&self) -> bool {
        self.name.is_empty()
    }
}
