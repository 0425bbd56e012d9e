//! # store::delivery_log
//!
//! Append-only audit of external-channel attempts, newest first, capped at
//! [`MAX_DELIVERY_LOG`].

use std::collections::VecDeque;

use crate::models::DeliveryLogEntry;

pub const MAX_DELIVERY_LOG: usize = 200;

#[derive(Debug, Default, Clone)]
pub struct DeliveryLog {
    entries: VecDeque<DeliveryLogEntry>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entries: Vec<DeliveryLogEntry>) -> Self {
        let mut entries: VecDeque<DeliveryLogEntry> = entries.into();
        entries.truncate(MAX_DELIVERY_LOG);
        Self { entries }
    }

    pub fn append(&mut self, entry: DeliveryLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(MAX_DELIVERY_LOG);
    }

    pub fn snapshot(&self) -> Vec<DeliveryLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| !e.sent).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
