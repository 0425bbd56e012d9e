//! # store::alerts
//!
//! **Alert Store**: most-recent-first list of surfaced alerts, capped at
//! [`MAX_ALERTS`].  The oldest entry is evicted silently on overflow.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::models::Alert;

pub const MAX_ALERTS: usize = 100;

#[derive(Debug, Default, Clone)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot (already most-recent-first).
    pub fn from_snapshot(alerts: Vec<Alert>) -> Self {
        let mut alerts: VecDeque<Alert> = alerts.into();
        alerts.truncate(MAX_ALERTS);
        Self { alerts }
    }

    pub fn insert(&mut self, alert: Alert) {
        self.alerts.push_front(alert);
        self.alerts.truncate(MAX_ALERTS);
    }

    /// Idempotent.  Returns `false` only when no alert has this id.
    pub fn acknowledge(&mut self, id: Uuid) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Flag a successful external delivery.  The alert may already have been
    /// evicted or cleared while the send was in flight.
    pub fn mark_external_sent(&mut self, id: Uuid) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.external_channel_sent = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.alerts.len();
        self.alerts.clear();
        removed
    }

    pub fn unread_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }

    pub fn get(&self, id: Uuid) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn unread(&self) -> Vec<Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
