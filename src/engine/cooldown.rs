//! # engine::cooldown
//!
//! **Cooldown Registry**: the only deduplication mechanism.
//!
//! A (symbol, kind) pair may fire again once the window (4 hours by default)
//! has elapsed since its last firing, even if the holding never left the
//! threshold.  Entries are process-local: a restart forgets them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::models::AlertKind;

pub const DEFAULT_COOLDOWN_HOURS: i64 = 4;

type CooldownKey = (String, AlertKind);

pub struct CooldownRegistry {
    entries: HashMap<CooldownKey, DateTime<Utc>>,
    window:  Duration,
    clock:   Arc<dyn Clock>,
}

impl CooldownRegistry {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            clock,
        }
    }

    /// `true` when no entry exists or the window has fully elapsed.
    pub fn may_fire(&self, symbol: &str, kind: AlertKind) -> bool {
        match self.entries.get(&(symbol.to_string(), kind)) {
            None => true,
            Some(last) => self.clock.now().signed_duration_since(*last) >= self.window,
        }
    }

    /// Unconditionally stamps the key with the current time.
    pub fn record_fired(&mut self, symbol: &str, kind: AlertKind) {
        self.entries.insert((symbol.to_string(), kind), self.clock.now());
    }

    /// Check and record in one step.  Returns `false` (and changes nothing)
    /// while the key is cooling down.
    pub fn try_fire(&mut self, symbol: &str, kind: AlertKind) -> bool {
        if !self.may_fire(symbol, kind) {
            debug!(symbol, %kind, "Cooldown active, alert suppressed");
            return false;
        }
        self.record_fired(symbol, kind);
        true
    }

    /// Forget the key so the next firing goes through immediately.
    pub fn reset(&mut self, symbol: &str, kind: AlertKind) -> bool {
        let removed = self.entries.remove(&(symbol.to_string(), kind)).is_some();
        info!(symbol, %kind, removed, "Cooldown reset");
        removed
    }

    pub fn last_fired(&self, symbol: &str, kind: AlertKind) -> Option<DateTime<Utc>> {
        self.entries.get(&(symbol.to_string(), kind)).copied()
    }

    /// Time left before the key may fire again, `None` if it may fire now.
    pub fn remaining(&self, symbol: &str, kind: AlertKind) -> Option<Duration> {
        let last = self.last_fired(symbol, kind)?;
        let elapsed = self.clock.now().signed_duration_since(last);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
