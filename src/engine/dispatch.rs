//! # engine::dispatch
//!
//! **Dispatch Pipeline**: turns one crossed threshold into a stored alert
//! plus an optional external delivery attempt.
//!
//! ## Two phases
//!
//! ```text
//!  admit()    cooldown check ─▶ record fired ─▶ render message ─▶ insert Alert
//!             (no I/O; runs in tick order)
//!
//!  deliver()  external channel send ─▶ delivery log row ─▶ mark Alert sent
//!             (awaits the network; may overlap the next tick)
//! ```
//!
//! The cooldown is stamped inside `admit`, before any await on the network,
//! so a slow send can never let an overlapping tick fire the same
//! (symbol, kind) twice.
//!
//! Delivery errors never leave this module: they become a failed
//! [`DeliveryLogEntry`] and a `warn!` line.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AlertConfig;
use crate::engine::cooldown::CooldownRegistry;
use crate::engine::templates;
use crate::events::{AlertEvent, EventBus};
use crate::models::{Alert, AlertKind, DeliveryLogEntry, HoldingSnapshot};
use crate::services::channel::{AlertChannel, ExternalAlert};
use crate::store::kv::{keys, load_json, save_json, KeyValueStore};
use crate::store::{AlertStore, DeliveryLog};

// ─── Request / Outcome ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub kind:            AlertKind,
    pub snapshot:        HoldingSnapshot,
    pub trigger_price:   f64,
    /// Σ market value over every holding priced this tick.
    pub portfolio_value: f64,
}

/// An alert that passed the cooldown and is already in the store, waiting
/// for its external delivery attempt.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub alert:   Alert,
    pub request: DispatchRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Cooling down; nothing was recorded.
    Suppressed,
    /// Alert stored; external channel inactive (disabled or no recipient).
    InAppOnly { alert_id: Uuid },
    Delivered { alert_id: Uuid },
    DeliveryFailed { alert_id: Uuid, error: String },
}

impl DispatchOutcome {
    pub fn alert_id(&self) -> Option<Uuid> {
        match self {
            DispatchOutcome::Suppressed => None,
            DispatchOutcome::InAppOnly { alert_id }
            | DispatchOutcome::Delivered { alert_id }
            | DispatchOutcome::DeliveryFailed { alert_id, .. } => Some(*alert_id),
        }
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

pub struct Dispatcher {
    cooldowns:    RwLock<CooldownRegistry>,
    alerts:       RwLock<AlertStore>,
    delivery_log: RwLock<DeliveryLog>,
    config:       Arc<RwLock<AlertConfig>>,
    channel:      Arc<dyn AlertChannel>,
    store:        Arc<dyn KeyValueStore>,
    events:       EventBus,
    clock:        Arc<dyn Clock>,
    cooldown_window: chrono::Duration,
    /// (UTC date, alerts admitted on that date)
    today:        Mutex<(NaiveDate, u64)>,
}

impl Dispatcher {
    /// Restores the alert list and delivery log from `store`.  Cooldowns
    /// always start empty.
    pub fn new(
        config:          Arc<RwLock<AlertConfig>>,
        channel:         Arc<dyn AlertChannel>,
        store:           Arc<dyn KeyValueStore>,
        events:          EventBus,
        clock:           Arc<dyn Clock>,
        cooldown_window: chrono::Duration,
    ) -> Self {
        let alerts = restore::<Vec<Alert>>(store.as_ref(), keys::ALERTS)
            .map(AlertStore::from_snapshot)
            .unwrap_or_default();
        let delivery_log = restore::<Vec<DeliveryLogEntry>>(store.as_ref(), keys::DELIVERY_LOG)
            .map(DeliveryLog::from_snapshot)
            .unwrap_or_default();

        if !alerts.is_empty() || !delivery_log.is_empty() {
            info!(
                alerts       = alerts.len(),
                delivery_log = delivery_log.len(),
                "Restored alert state"
            );
        }

        let today = clock.now().date_naive();
        Self {
            cooldowns: RwLock::new(CooldownRegistry::new(cooldown_window, Arc::clone(&clock))),
            cooldown_window,
            alerts: RwLock::new(alerts),
            delivery_log: RwLock::new(delivery_log),
            config,
            channel,
            store,
            events,
            clock,
            today: Mutex::new((today, 0)),
        }
    }

    // ── Pipeline ──────────────────────────────────────────────────────────────

    /// Admit and deliver in one call.
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchOutcome {
        match self.admit(request).await {
            Some(admitted) => self.deliver(admitted).await,
            None => DispatchOutcome::Suppressed,
        }
    }

    /// Cooldown gate plus alert creation.  `None` means suppressed: no
    /// alert, no log row, no state change.
    pub async fn admit(&self, request: DispatchRequest) -> Option<Admitted> {
        let symbol = request.snapshot.symbol().to_string();

        if !self.cooldowns.write().await.try_fire(&symbol, request.kind) {
            return None;
        }

        let message = templates::message(request.kind, &symbol, request.trigger_price);
        let alert = Alert::new(
            request.kind,
            &symbol,
            message,
            request.trigger_price,
            request.snapshot.current_price,
            self.clock.now(),
        );

        {
            let mut alerts = self.alerts.write().await;
            alerts.insert(alert.clone());
            self.persist(keys::ALERTS, &alerts.snapshot());
        }
        self.count_today();

        info!(
            symbol        = %alert.symbol,
            kind          = %alert.kind,
            trigger_price = alert.trigger_price,
            current_price = alert.current_price,
            "🔔 Alert fired"
        );
        self.events.publish(&AlertEvent::AlertFired { alert: Box::new(alert.clone()) });

        Some(Admitted { alert, request })
    }

    /// External delivery for an admitted alert.  A no-op (in-app only) when
    /// the channel is disabled or has no recipient.
    pub async fn deliver(&self, admitted: Admitted) -> DispatchOutcome {
        let Admitted { alert, request } = admitted;
        let config = self.config.read().await.clone();

        if !config.external_channel_active() {
            return DispatchOutcome::InAppOnly { alert_id: alert.id };
        }

        let snapshot = &request.snapshot;
        let payload = ExternalAlert {
            recipient:       config.recipient_address.clone(),
            kind:            alert.kind,
            symbol:          alert.symbol.clone(),
            trigger_price:   alert.trigger_price,
            current_price:   alert.current_price,
            average_cost:    snapshot.holding.average_cost,
            shares:          snapshot.holding.shares,
            gain_loss:       snapshot.gain_loss(),
            gain_loss_pct:   snapshot.gain_loss_pct(),
            portfolio_value: request.portfolio_value,
            action_text:     alert.message.clone(),
        };

        let (provider, result) = self.channel.attempt(&payload).await;

        let entry = DeliveryLogEntry {
            id:            Uuid::now_v7(),
            timestamp:     self.clock.now(),
            kind:          alert.kind,
            symbol:        alert.symbol.clone(),
            recipient:     payload.recipient.clone(),
            trigger_price: alert.trigger_price,
            current_price: alert.current_price,
            sent:          result.is_ok(),
            error:         result.as_ref().err().map(ToString::to_string),
            provider:      provider.to_string(),
        };
        {
            let mut log = self.delivery_log.write().await;
            log.append(entry.clone());
            self.persist(keys::DELIVERY_LOG, &log.snapshot());
        }
        self.events.publish(&AlertEvent::DeliveryLogged { entry: Box::new(entry) });

        match result {
            Ok(()) => {
                {
                    let mut alerts = self.alerts.write().await;
                    if alerts.mark_external_sent(alert.id) {
                        self.persist(keys::ALERTS, &alerts.snapshot());
                    }
                }
                info!(
                    symbol    = %alert.symbol,
                    kind      = %alert.kind,
                    provider,
                    "✅ External alert delivered"
                );
                DispatchOutcome::Delivered { alert_id: alert.id }
            }
            Err(e) => {
                warn!(
                    symbol   = %alert.symbol,
                    kind     = %alert.kind,
                    provider,
                    error    = %e,
                    "External alert delivery failed"
                );
                DispatchOutcome::DeliveryFailed {
                    alert_id: alert.id,
                    error:    e.to_string(),
                }
            }
        }
    }

    // ── Alert Store ───────────────────────────────────────────────────────────

    /// Idempotent.  `false` only when the id is unknown.
    pub async fn acknowledge(&self, id: Uuid) -> bool {
        let found = {
            let mut alerts = self.alerts.write().await;
            let found = alerts.acknowledge(id);
            if found {
                self.persist(keys::ALERTS, &alerts.snapshot());
            }
            found
        };
        if found {
            self.events.publish(&AlertEvent::AlertAcknowledged { alert_id: id });
        }
        found
    }

    pub async fn clear_all(&self) -> usize {
        let removed = {
            let mut alerts = self.alerts.write().await;
            let removed = alerts.clear_all();
            self.persist(keys::ALERTS, &alerts.snapshot());
            removed
        };
        info!(removed, "🧹 In-app alerts cleared");
        self.events.publish(&AlertEvent::AlertsCleared { removed });
        removed
    }

    pub async fn unread_count(&self) -> usize {
        self.alerts.read().await.unread_count()
    }

    pub async fn alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts.read().await.get(id).cloned()
    }

    /// Most recent first.
    pub async fn alerts_snapshot(&self, unacknowledged_only: bool) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        if unacknowledged_only {
            alerts.unread()
        } else {
            alerts.snapshot()
        }
    }

    /// Newest first.
    pub async fn delivery_log_snapshot(&self) -> Vec<DeliveryLogEntry> {
        self.delivery_log.read().await.snapshot()
    }

    pub async fn delivery_failures(&self) -> usize {
        self.delivery_log.read().await.failures()
    }

    // ── Cooldowns ─────────────────────────────────────────────────────────────

    pub async fn reset_cooldown(&self, symbol: &str, kind: AlertKind) -> bool {
        let removed = self.cooldowns.write().await.reset(symbol, kind);
        self.events.publish(&AlertEvent::CooldownReset {
            symbol: symbol.to_string(),
            kind,
        });
        removed
    }

    pub async fn may_fire(&self, symbol: &str, kind: AlertKind) -> bool {
        self.cooldowns.read().await.may_fire(symbol, kind)
    }

    /// Time left before (symbol, kind) may fire again; `None` when it may
    /// fire now.
    pub async fn cooldown_remaining(&self, symbol: &str, kind: AlertKind) -> Option<chrono::Duration> {
        self.cooldowns.read().await.remaining(symbol, kind)
    }

    pub fn cooldown_window(&self) -> chrono::Duration {
        self.cooldown_window
    }

    // ── Status ────────────────────────────────────────────────────────────────

    /// Alerts admitted since UTC midnight.
    pub fn alerts_today(&self) -> u64 {
        let today = self.clock.now().date_naive();
        let counter = self.today.lock();
        if counter.0 == today { counter.1 } else { 0 }
    }

    pub fn channel_provider(&self) -> &'static str {
        self.channel.provider()
    }

    pub fn channel_configured(&self) -> bool {
        self.channel.is_configured()
    }

    fn count_today(&self) {
        let today = self.clock.now().date_naive();
        let mut counter = self.today.lock();
        if counter.0 != today {
            *counter = (today, 0);
        }
        counter.1 += 1;
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = save_json(self.store.as_ref(), key, value) {
            warn!(key, error = %e, "Failed to persist alert state");
        }
    }
}

fn restore<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match load_json(store, key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to read persisted alert state");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::DeliveryError;
    use crate::models::Holding;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use tokio::sync::Notify;

    /// Records every payload; fails when `fail` is set.
    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        pub sent: Mutex<Vec<ExternalAlert>>,
        pub fail: bool,
    }

    #[async_trait]
    impl AlertChannel for RecordingChannel {
        fn provider(&self) -> &'static str {
            "recording"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn send_external_alert(&self, alert: &ExternalAlert) -> Result<(), DeliveryError> {
            self.sent.lock().push(alert.clone());
            if self.fail {
                Err(DeliveryError::Rejected {
                    provider: "recording",
                    status:   401,
                    body:     "unauthorized".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// Blocks every send until released.
    struct GatedChannel {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AlertChannel for GatedChannel {
        fn provider(&self) -> &'static str {
            "gated"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn send_external_alert(&self, _alert: &ExternalAlert) -> Result<(), DeliveryError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        "2026-03-02T14:30:00Z".parse().unwrap()
    }

    pub(crate) fn active_config() -> AlertConfig {
        AlertConfig {
            enabled: true,
            recipient_address: "ops@example.com".into(),
            ..AlertConfig::default()
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        clock:      Arc<ManualClock>,
        store:      Arc<MemoryStore>,
    }

    fn fixture(config: AlertConfig, channel: Arc<dyn AlertChannel>) -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(RwLock::new(config)),
            channel,
            store.clone(),
            EventBus::new(),
            clock.clone(),
            ChronoDuration::hours(4),
        );
        Fixture { dispatcher, clock, store }
    }

    fn nvda_above_target() -> DispatchRequest {
        let holding = Holding::new("NVDA", 10.0, 120.0, 1.98).with_reference_price(150.0);
        let snapshot = HoldingSnapshot::new(holding, 190.0);
        DispatchRequest {
            kind:            AlertKind::SellTargetHit,
            trigger_price:   snapshot.ladder().sell_target,
            portfolio_value: snapshot.market_value(),
            snapshot,
        }
    }

    #[tokio::test]
    async fn cooldown_suppresses_within_window_and_refires_after() {
        let channel = Arc::new(RecordingChannel::default());
        let fx = fixture(active_config(), channel.clone());

        let first = fx.dispatcher.dispatch(nvda_above_target()).await;
        assert!(matches!(first, DispatchOutcome::Delivered { .. }));

        fx.clock.advance(ChronoDuration::hours(1));
        let second = fx.dispatcher.dispatch(nvda_above_target()).await;
        assert_eq!(second, DispatchOutcome::Suppressed);
        assert_eq!(fx.dispatcher.alerts_snapshot(false).await.len(), 1);
        assert_eq!(fx.dispatcher.delivery_log_snapshot().await.len(), 1);

        fx.clock.advance(ChronoDuration::hours(4));
        let third = fx.dispatcher.dispatch(nvda_above_target()).await;
        assert!(matches!(third, DispatchOutcome::Delivered { .. }));
        assert_eq!(fx.dispatcher.alerts_snapshot(false).await.len(), 2);
        assert_eq!(fx.dispatcher.delivery_log_snapshot().await.len(), 2);
        assert_eq!(channel.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn no_recipient_means_in_app_only() {
        let channel = Arc::new(RecordingChannel::default());
        let config = AlertConfig { enabled: true, ..AlertConfig::default() };
        let fx = fixture(config, channel.clone());

        let outcome = fx.dispatcher.dispatch(nvda_above_target()).await;
        assert!(matches!(outcome, DispatchOutcome::InAppOnly { .. }));

        let alerts = fx.dispatcher.alerts_snapshot(false).await;
        assert_eq!(alerts.len(), 1);
        assert!(!alerts[0].external_channel_sent);
        assert!(fx.dispatcher.delivery_log_snapshot().await.is_empty());
        assert!(channel.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn successful_delivery_marks_alert_and_logs_payload() {
        let channel = Arc::new(RecordingChannel::default());
        let fx = fixture(active_config(), channel.clone());

        let outcome = fx.dispatcher.dispatch(nvda_above_target()).await;
        let alert = fx.dispatcher.alert(outcome.alert_id().unwrap()).await.unwrap();
        assert!(alert.external_channel_sent);
        assert_eq!(
            alert.message,
            format!("NVDA has reached its sell target at ${:.2}. Consider taking profits.", alert.trigger_price)
        );

        let log = fx.dispatcher.delivery_log_snapshot().await;
        assert!(log[0].sent);
        assert_eq!(log[0].provider, "recording");
        assert_eq!(log[0].recipient, "ops@example.com");

        let sent = channel.sent.lock();
        assert_eq!(sent[0].shares, 10.0);
        assert_eq!(sent[0].average_cost, 120.0);
        assert!((sent[0].gain_loss - 700.0).abs() < 1e-9);
        assert!((sent[0].portfolio_value - 1_900.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_alert_and_logs_error() {
        let channel = Arc::new(RecordingChannel { fail: true, ..Default::default() });
        let fx = fixture(active_config(), channel);

        let outcome = fx.dispatcher.dispatch(nvda_above_target()).await;
        let DispatchOutcome::DeliveryFailed { alert_id, error } = outcome.clone() else {
            panic!("expected failed delivery, got {outcome:?}");
        };
        assert!(error.contains("401"));

        let alert = fx.dispatcher.alert(alert_id).await.unwrap();
        assert!(!alert.external_channel_sent);

        let log = fx.dispatcher.delivery_log_snapshot().await;
        assert_eq!(log.len(), 1);
        assert_eq!(fx.dispatcher.delivery_failures().await, 1);
        assert!(!log[0].sent);
        assert_eq!(log[0].error.as_deref(), Some(error.as_str()));
    }

    #[tokio::test]
    async fn cooldown_is_recorded_before_the_send_resolves() {
        let channel = Arc::new(GatedChannel { entered: Notify::new(), release: Notify::new() });
        let fx = fixture(active_config(), channel.clone());
        let dispatcher = Arc::new(fx.dispatcher);

        let in_flight = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.dispatch(nvda_above_target()).await })
        };
        channel.entered.notified().await;

        // A second tick while the first send is still pending.
        assert!(!dispatcher.may_fire("NVDA", AlertKind::SellTargetHit).await);
        assert!(dispatcher.admit(nvda_above_target()).await.is_none());

        channel.release.notify_one();
        let outcome = in_flight.await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
        assert_eq!(dispatcher.alerts_snapshot(false).await.len(), 1);
    }

    #[tokio::test]
    async fn acknowledge_and_clear_track_unread_count() {
        let fx = fixture(AlertConfig { enabled: true, ..AlertConfig::default() }, Arc::new(RecordingChannel::default()));

        let first = fx.dispatcher.dispatch(nvda_above_target()).await.alert_id().unwrap();
        let mut stop = nvda_above_target();
        stop.kind = AlertKind::StopLossHit;
        fx.dispatcher.dispatch(stop).await;
        assert_eq!(fx.dispatcher.unread_count().await, 2);

        assert!(fx.dispatcher.acknowledge(first).await);
        assert_eq!(fx.dispatcher.unread_count().await, 1);
        assert!(fx.dispatcher.acknowledge(first).await);
        assert_eq!(fx.dispatcher.unread_count().await, 1);
        assert!(!fx.dispatcher.acknowledge(Uuid::now_v7()).await);
        assert_eq!(fx.dispatcher.alerts_snapshot(true).await.len(), 1);

        assert_eq!(fx.dispatcher.clear_all().await, 2);
        assert!(fx.dispatcher.alerts_snapshot(false).await.is_empty());
        assert_eq!(fx.dispatcher.unread_count().await, 0);
    }

    #[tokio::test]
    async fn reset_allows_immediate_refire() {
        let fx = fixture(AlertConfig::default(), Arc::new(RecordingChannel::default()));

        assert!(fx.dispatcher.admit(nvda_above_target()).await.is_some());
        assert!(fx.dispatcher.admit(nvda_above_target()).await.is_none());
        fx.clock.advance(ChronoDuration::minutes(30));
        assert_eq!(
            fx.dispatcher.cooldown_remaining("NVDA", AlertKind::SellTargetHit).await,
            Some(ChronoDuration::minutes(210))
        );
        assert!(fx.dispatcher.reset_cooldown("NVDA", AlertKind::SellTargetHit).await);
        assert!(fx.dispatcher.admit(nvda_above_target()).await.is_some());
        assert_eq!(fx.dispatcher.cooldown_window(), ChronoDuration::hours(4));
    }

    #[tokio::test]
    async fn alerts_today_resets_at_utc_midnight() {
        let fx = fixture(AlertConfig::default(), Arc::new(RecordingChannel::default()));

        fx.dispatcher.dispatch(nvda_above_target()).await;
        assert_eq!(fx.dispatcher.alerts_today(), 1);

        fx.clock.advance(ChronoDuration::hours(12));
        assert_eq!(fx.dispatcher.alerts_today(), 0);
        fx.dispatcher.dispatch(nvda_above_target()).await;
        assert_eq!(fx.dispatcher.alerts_today(), 1);
    }

    #[tokio::test]
    async fn state_survives_a_restart_but_cooldowns_do_not() {
        let fx = fixture(active_config(), Arc::new(RecordingChannel::default()));
        let id = fx.dispatcher.dispatch(nvda_above_target()).await.alert_id().unwrap();
        fx.dispatcher.acknowledge(id).await;

        let restarted = Dispatcher::new(
            Arc::new(RwLock::new(active_config())),
            Arc::new(RecordingChannel::default()),
            fx.store.clone(),
            EventBus::new(),
            fx.clock.clone(),
            ChronoDuration::hours(4),
        );

        let alerts = restarted.alerts_snapshot(false).await;
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].acknowledged);
        assert!(alerts[0].external_channel_sent);
        assert_eq!(restarted.delivery_log_snapshot().await.len(), 1);
        assert!(restarted.may_fire("NVDA", AlertKind::SellTargetHit).await);
    }
}
