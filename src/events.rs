//! # events
//!
//! [`AlertEvent`]: everything the agent broadcasts to dashboard clients over
//! `/ws/alerts`.
//!
//! Events travel as pre-serialized JSON strings on a
//! `tokio::sync::broadcast` channel, so the channel never needs `Clone` on
//! the payload types.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::monitor::MonitorState;
use crate::models::{Alert, AlertKind, DeliveryLogEntry};

/// Slow WebSocket clients skip events beyond this backlog.
const EVENT_BACKLOG: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEvent {
    /// A new alert entered the store.
    AlertFired {
        alert: Box<Alert>,
    },

    AlertAcknowledged {
        alert_id: Uuid,
    },

    AlertsCleared {
        removed: usize,
    },

    /// One external-channel attempt finished, sent or not.
    DeliveryLogged {
        entry: Box<DeliveryLogEntry>,
    },

    MonitorStateChanged {
        from: MonitorState,
        to:   MonitorState,
    },

    CooldownReset {
        symbol: String,
        kind:   AlertKind,
    },
}

impl AlertEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<String>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BACKLOG);
        Self { tx }
    }

    /// Fire-and-forget.  Having no subscriber is not an error.
    pub fn publish(&self, event: &AlertEvent) {
        let _ = self.tx.send(event.to_json());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
