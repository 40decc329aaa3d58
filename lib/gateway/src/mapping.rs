//! Gateway-wide topic name↔id mapping table, shared across every session
//! (spec.md §3, §4.5 "Topic-id allocation").

use heapless::Vec;
use mqttsn_core::config::{TOPIC_NOTASSIGNED, TOPIC_UNSUBSCRIBED};
use mqttsn_core::TopicMapping;

pub struct MappingTable<const N: usize> {
    slots: Vec<TopicMapping, N>,
}

impl<const N: usize> Default for MappingTable<N> {
    fn default() -> Self {
        MappingTable { slots: Vec::new() }
    }
}

impl<const N: usize> MappingTable<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|m| !m.is_empty_slot() && m.name.as_str() == name)
    }

    pub fn find_by_id(&self, tid: u16) -> Option<usize> {
        self.slots.iter().position(|m| !m.is_empty_slot() && m.tid == tid)
    }

    pub fn get(&self, idx: usize) -> Option<&TopicMapping> {
        self.slots.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut TopicMapping> {
        self.slots.get_mut(idx)
    }

    /// Resolves `name` to its id, allocating a new slot if unseen. Skips
    /// the reserved ids (0, 0xFFFF) per spec.md invariant #4. Returns
    /// `None` if the table is full (caller replies CONGESTION).
    pub fn allocate(&mut self, name: &str) -> Option<u16> {
        if let Some(idx) = self.find_by_name(name) {
            return Some(self.slots[idx].tid);
        }
        let idx = self.slots.iter().position(|m| m.is_empty_slot()).unwrap_or(self.slots.len());
        let mut tid = (idx as u16).wrapping_add(1);
        if tid == TOPIC_NOTASSIGNED || tid == TOPIC_UNSUBSCRIBED {
            tid = tid.wrapping_add(1);
        }
        let mapping = TopicMapping {
            name: mqttsn_core::TopicName::try_from(name).ok()?,
            tid,
            subbed: false,
            sub_qos: 0,
        };
        if idx < self.slots.len() {
            self.slots[idx] = mapping;
        } else {
            self.slots.push(mapping).ok()?;
        }
        Some(tid)
    }
}
