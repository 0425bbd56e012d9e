//! # engine::monitor
//!
//! **Monitoring Loop**: the only recurring task in the agent.
//!
//! ## States
//!
//! ```text
//!   Idle ──(recipient set)──▶ Paused ──(enabled)──▶ Running
//!    ▲                          │                      │
//!    └──(recipient cleared)─────┘◀────(disabled)───────┘
//! ```
//!
//! The state is a pure function of the alert configuration.  Entering
//! `Running` starts the scheduler and runs one evaluation pass immediately;
//! leaving it cancels the pending timer.  A poll-interval change while
//! `Running` restarts the timer with the new period.
//!
//! ## Per tick
//! Holdings are evaluated in enumeration order.  The live quote is compared
//! against the ladder the holding was registered with, so a quote that rises
//! through the sell target or falls through the trailing stop crosses it.  A
//! holding with bad inputs or no usable quote is skipped for this tick only.  Every crossed threshold is
//! admitted in order; external deliveries then run as detached tasks, so a
//! slow send may still be in flight when the next tick starts.

use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{AlertConfig, AlertConfigUpdate};
use crate::engine::dispatch::{DispatchOutcome, DispatchRequest, Dispatcher};
use crate::engine::scheduler::{Scheduler, TickFn};
use crate::error::{AppError, ConfigError};
use crate::events::{AlertEvent, EventBus};
use crate::models::{Alert, AlertKind, HoldingSnapshot};
use crate::services::{HoldingSource, QuoteSource};
use crate::store::kv::{keys, save_json, KeyValueStore};

// ─── MonitorState ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Disabled, no recipient configured.
    Idle,
    /// Disabled, recipient configured.
    Paused,
    Running,
}

impl MonitorState {
    pub fn from_config(config: &AlertConfig) -> Self {
        if config.enabled {
            MonitorState::Running
        } else if config.has_recipient() {
            MonitorState::Paused
        } else {
            MonitorState::Idle
        }
    }
}

// ─── Threshold evaluation ─────────────────────────────────────────────────────

/// Every enabled threshold the live price has crossed on the holding's
/// ladder, with its trigger price.
/// The four checks are independent: one holding can cross several at once.
pub fn crossings(config: &AlertConfig, snapshot: &HoldingSnapshot) -> Vec<(AlertKind, f64)> {
    let ladder = snapshot.ladder();
    let price = snapshot.current_price;
    let mut crossed = Vec::new();

    if config.alert_on_sell_target && price >= ladder.sell_target {
        crossed.push((AlertKind::SellTargetHit, ladder.sell_target));
    }
    if config.alert_on_stop_loss && price <= ladder.stop_loss {
        crossed.push((AlertKind::StopLossHit, ladder.stop_loss));
    }
    if config.alert_on_trailing_stop && price <= ladder.trailing_stop {
        crossed.push((AlertKind::TrailingStopHit, ladder.trailing_stop));
    }
    if config.alert_on_bull_target && price >= ladder.bull_target {
        crossed.push((AlertKind::BullTargetHit, ladder.bull_target));
    }
    crossed
}

// ─── Reports ──────────────────────────────────────────────────────────────────

/// What one evaluation pass did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub evaluated:       usize,
    /// Symbols skipped for this tick (bad inputs or no usable quote).
    pub skipped:         Vec<String>,
    pub portfolio_value: f64,
    /// Alerts admitted this tick, in firing order.
    pub fired:           Vec<Uuid>,
    /// Detached external deliveries, one per fired alert.
    pub deliveries:      Vec<JoinHandle<DispatchOutcome>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub state:                       MonitorState,
    pub enabled:                     bool,
    pub recipient_address:           String,
    pub recipient_configured:        bool,
    pub external_channel_configured: bool,
    pub external_provider:           &'static str,
    pub monitored_symbols:           Vec<String>,
    pub unacknowledged:              usize,
    pub alerts_today:                u64,
    pub uptime_seconds:              i64,
    pub poll_interval_ms:            u64,
    pub cooldown_hours:              i64,
}

// ─── Monitor ──────────────────────────────────────────────────────────────────

pub struct Monitor {
    config:     Arc<RwLock<AlertConfig>>,
    dispatcher: Arc<Dispatcher>,
    holdings:   Arc<dyn HoldingSource>,
    quotes:     Arc<dyn QuoteSource>,
    scheduler:  Arc<dyn Scheduler>,
    store:      Arc<dyn KeyValueStore>,
    events:     EventBus,
    clock:      Arc<dyn Clock>,
    /// Held across a whole update so concurrent updates serialize.
    state:      AsyncMutex<MonitorState>,
    started_at: chrono::DateTime<chrono::Utc>,
    this:       Weak<Monitor>,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config:     Arc<RwLock<AlertConfig>>,
        dispatcher: Arc<Dispatcher>,
        holdings:   Arc<dyn HoldingSource>,
        quotes:     Arc<dyn QuoteSource>,
        scheduler:  Arc<dyn Scheduler>,
        store:      Arc<dyn KeyValueStore>,
        events:     EventBus,
        clock:      Arc<dyn Clock>,
    ) -> Arc<Self> {
        let started_at = clock.now();
        Arc::new_cyclic(|this| Self {
            config,
            dispatcher,
            holdings,
            quotes,
            scheduler,
            store,
            events,
            clock,
            state: AsyncMutex::new(MonitorState::Idle),
            started_at,
            this: this.clone(),
        })
    }

    /// Bring the loop in line with the configuration loaded at startup.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        let config = self.config.read().await.clone();
        let started = self.transition(&mut state, &config, &config);
        drop(state);

        if started {
            self.run_tick().await;
        }
    }

    /// Cancel the pending timer.  In-flight deliveries finish on their own.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        info!("🛑 Monitor shut down");
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.lock().await
    }

    pub async fn config(&self) -> AlertConfig {
        self.config.read().await.clone()
    }

    /// Apply a partial update, persist it, then move to the state it implies.
    pub async fn update_configuration(
        &self,
        update: AlertConfigUpdate,
    ) -> Result<AlertConfig, ConfigError> {
        let mut state = self.state.lock().await;
        let (before, after) = {
            let mut config = self.config.write().await;
            let before = config.clone();
            config.apply(update)?;
            (before, config.clone())
        };

        if let Err(e) = save_json(self.store.as_ref(), keys::CONFIG, &after) {
            warn!(error = %e, "Failed to persist alert configuration");
        }
        info!(
            enabled          = after.enabled,
            recipient_set    = after.has_recipient(),
            poll_interval_ms = after.poll_interval.as_millis(),
            "⚙️  Alert configuration updated"
        );

        let started = self.transition(&mut state, &before, &after);
        drop(state);

        // Immediate pass before the first timer tick, outside the state lock
        // so status reads do not wait on quote fetches.
        if started {
            self.run_tick().await;
        }
        Ok(after)
    }

    /// Returns `true` when the loop just entered `Running`.
    fn transition(&self, state: &mut MonitorState, before: &AlertConfig, after: &AlertConfig) -> bool {
        let from = *state;
        let to = MonitorState::from_config(after);
        *state = to;

        let was_running = self.scheduler.is_running();
        let now_running = to == MonitorState::Running;
        match (was_running, now_running) {
            (false, true) => {
                self.scheduler.start(after.poll_interval.as_duration(), self.tick_fn());
                info!(poll_interval_ms = after.poll_interval.as_millis(), "▶️  Monitoring started");
            }
            (true, true) if before.poll_interval != after.poll_interval => {
                self.scheduler.reschedule(after.poll_interval.as_duration());
                info!(poll_interval_ms = after.poll_interval.as_millis(), "🔁 Poll interval changed");
            }
            (true, false) => {
                self.scheduler.stop();
                info!("⏸  Monitoring stopped");
            }
            _ => {}
        }

        if from != to {
            info!(?from, ?to, "Monitor state changed");
            self.events.publish(&AlertEvent::MonitorStateChanged { from, to });
        }
        !was_running && now_running
    }

    fn tick_fn(&self) -> TickFn {
        let this = self.this.clone();
        Arc::new(move || {
            let this = this.clone();
            async move {
                if let Some(monitor) = this.upgrade() {
                    monitor.run_tick().await;
                }
            }
            .boxed()
        })
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// One evaluation pass over every registered holding.
    pub async fn run_tick(&self) -> TickReport {
        let config = self.config.read().await.clone();
        let mut report = TickReport::default();
        if !config.enabled {
            return report;
        }

        let holdings = match self.holdings.enumerate_holdings().await {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!(error = %e, "Holding enumeration failed, retrying next tick");
                return report;
            }
        };

        let mut snapshots = Vec::with_capacity(holdings.len());
        for holding in holdings {
            if !holding.is_valid() {
                warn!(symbol = %holding.symbol, "Skipping holding with invalid inputs");
                report.skipped.push(holding.symbol);
                continue;
            }
            match self.quotes.current_price(&holding.symbol).await {
                Ok(price) if price.is_finite() && price > 0.0 => {
                    snapshots.push(HoldingSnapshot::new(holding, price));
                }
                Ok(price) => {
                    warn!(symbol = %holding.symbol, price, "Skipping symbol, unusable price");
                    report.skipped.push(holding.symbol);
                }
                Err(e) => {
                    warn!(symbol = %holding.symbol, error = %e, "Skipping symbol, quote unavailable");
                    report.skipped.push(holding.symbol);
                }
            }
        }

        report.evaluated = snapshots.len();
        report.portfolio_value = snapshots.iter().map(HoldingSnapshot::market_value).sum();

        for snapshot in &snapshots {
            for (kind, trigger_price) in crossings(&config, snapshot) {
                let request = DispatchRequest {
                    kind,
                    snapshot: snapshot.clone(),
                    trigger_price,
                    portfolio_value: report.portfolio_value,
                };
                if let Some(admitted) = self.dispatcher.admit(request).await {
                    report.fired.push(admitted.alert.id);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    report
                        .deliveries
                        .push(tokio::spawn(async move { dispatcher.deliver(admitted).await }));
                }
            }
        }

        debug!(
            evaluated       = report.evaluated,
            skipped         = report.skipped.len(),
            fired           = report.fired.len(),
            portfolio_value = report.portfolio_value,
            "Tick complete"
        );
        report
    }

    /// Operator verification: reset the cooldown for (symbol, kind) and fire
    /// it now at the matching ladder level, awaiting the external send.
    pub async fn test_fire(
        &self,
        symbol: &str,
        kind: AlertKind,
    ) -> Result<(Alert, DispatchOutcome), AppError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let holding = self
            .holdings
            .enumerate_holdings()
            .await?
            .into_iter()
            .find(|h| h.symbol == symbol)
            .ok_or_else(|| AppError::NotFound(format!("No registered holding for {symbol}")))?;
        if !holding.is_valid() {
            return Err(AppError::BadRequest(format!("Holding {symbol} has invalid inputs")));
        }

        let price = self.quotes.current_price(&symbol).await?;
        let snapshot = HoldingSnapshot::new(holding, price);
        let ladder = snapshot.ladder();
        let trigger_price = match kind {
            AlertKind::SellTargetHit   => ladder.sell_target,
            AlertKind::StopLossHit     => ladder.stop_loss,
            AlertKind::TrailingStopHit => ladder.trailing_stop,
            AlertKind::BullTargetHit   => ladder.bull_target,
            AlertKind::DailySummary    => price,
        };

        self.dispatcher.reset_cooldown(&symbol, kind).await;
        info!(%symbol, %kind, "🧪 Test alert requested");

        let request = DispatchRequest {
            kind,
            portfolio_value: snapshot.market_value(),
            snapshot,
            trigger_price,
        };
        let outcome = self.dispatcher.dispatch(request).await;
        let alert = match outcome.alert_id() {
            Some(id) => self.dispatcher.alert(id).await,
            None => None,
        }
        .ok_or_else(|| anyhow::anyhow!("test alert for {symbol} was not recorded"))?;

        Ok((alert, outcome))
    }

    // ── Status ────────────────────────────────────────────────────────────────

    pub async fn status(&self) -> MonitorStatus {
        let config = self.config.read().await.clone();
        let monitored_symbols = match self.holdings.enumerate_holdings().await {
            Ok(holdings) => holdings.into_iter().map(|h| h.symbol).collect(),
            Err(e) => {
                warn!(error = %e, "Holding enumeration failed while building status");
                Vec::new()
            }
        };

        MonitorStatus {
            state:                       self.state().await,
            enabled:                     config.enabled,
            recipient_configured:        config.has_recipient(),
            recipient_address:           config.recipient_address.clone(),
            external_channel_configured: self.dispatcher.channel_configured(),
            external_provider:           self.dispatcher.channel_provider(),
            monitored_symbols,
            unacknowledged:              self.dispatcher.unread_count().await,
            alerts_today:                self.dispatcher.alerts_today(),
            uptime_seconds:              (self.clock.now() - self.started_at).num_seconds(),
            poll_interval_ms:            config.poll_interval.as_millis(),
            cooldown_hours:              self.dispatcher.cooldown_window().num_hours(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use crate::clock::ManualClock;
    use crate::config::PollInterval;
    use crate::engine::dispatch::tests::{active_config, t0, RecordingChannel};
    use crate::engine::scheduler::ManualScheduler;
    use crate::error::CollaboratorError;
    use crate::models::Holding;
    use crate::services::PortfolioRegistry;
    use crate::store::MemoryStore;

    /// Holds a quote read open until released.
    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    /// Fixed prices; unknown symbols are unavailable.
    #[derive(Default)]
    struct FakeQuotes {
        prices: Mutex<HashMap<String, f64>>,
        gate:   Mutex<Option<Arc<Gate>>>,
    }

    impl FakeQuotes {
        fn set(&self, symbol: &str, price: f64) {
            self.prices.lock().insert(symbol.to_string(), price);
        }

        fn gated(&self) -> Arc<Gate> {
            let gate = Arc::new(Gate::default());
            *self.gate.lock() = Some(Arc::clone(&gate));
            gate
        }
    }

    #[async_trait]
    impl QuoteSource for FakeQuotes {
        async fn current_price(&self, symbol: &str) -> Result<f64, CollaboratorError> {
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            self.prices
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| CollaboratorError::Unavailable(format!("quote for {symbol}")))
        }
    }

    struct BrokenPortfolio;

    #[async_trait]
    impl HoldingSource for BrokenPortfolio {
        async fn enumerate_holdings(&self) -> Result<Vec<Holding>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("portfolio".into()))
        }
    }

    struct Fixture {
        monitor:   Arc<Monitor>,
        scheduler: Arc<ManualScheduler>,
        quotes:    Arc<FakeQuotes>,
        portfolio: Arc<PortfolioRegistry>,
        channel:   Arc<RecordingChannel>,
        clock:     Arc<ManualClock>,
        store:     Arc<MemoryStore>,
    }

    fn fixture_with(config: AlertConfig, holdings: Option<Arc<dyn HoldingSource>>) -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new());
        let events = EventBus::new();
        let channel = Arc::new(RecordingChannel::default());
        let config = Arc::new(RwLock::new(config));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config),
            channel.clone(),
            store.clone(),
            events.clone(),
            clock.clone(),
            ChronoDuration::hours(4),
        ));
        let scheduler = Arc::new(ManualScheduler::new());
        let quotes = Arc::new(FakeQuotes::default());
        let portfolio = Arc::new(PortfolioRegistry::new());
        let holdings = holdings.unwrap_or_else(|| portfolio.clone() as Arc<dyn HoldingSource>);

        let monitor = Monitor::new(
            config,
            dispatcher,
            holdings,
            quotes.clone(),
            scheduler.clone(),
            store.clone(),
            events,
            clock.clone(),
        );
        Fixture { monitor, scheduler, quotes, portfolio, channel, clock, store }
    }

    fn fixture(config: AlertConfig) -> Fixture {
        fixture_with(config, None)
    }

    async fn settle(report: TickReport) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        for handle in report.deliveries {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    }

    /// Registered in profit at 150: sell 184.85, bull 225.52, stop 132.08,
    /// trailing 138.
    fn nvda_in_profit() -> Holding {
        Holding::new("NVDA", 10.0, 120.0, 1.98).with_reference_price(150.0)
    }

    /// Registered underwater at 100: stop 105.60, trailing 92.
    fn nvda_underwater() -> Holding {
        Holding::new("NVDA", 10.0, 120.0, 1.98).with_reference_price(100.0)
    }

    fn kinds(crossed: &[(AlertKind, f64)]) -> Vec<AlertKind> {
        crossed.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn state_follows_configuration() {
        let mut cfg = AlertConfig::default();
        assert_eq!(MonitorState::from_config(&cfg), MonitorState::Idle);
        cfg.recipient_address = "ops@example.com".into();
        assert_eq!(MonitorState::from_config(&cfg), MonitorState::Paused);
        cfg.enabled = true;
        assert_eq!(MonitorState::from_config(&cfg), MonitorState::Running);
        cfg.recipient_address.clear();
        assert_eq!(MonitorState::from_config(&cfg), MonitorState::Running);
    }

    #[test]
    fn crossings_are_independent() {
        let mut cfg = AlertConfig { alert_on_bull_target: true, ..AlertConfig::default() };

        let surge = HoldingSnapshot::new(nvda_in_profit(), 230.0);
        assert_eq!(kinds(&crossings(&cfg, &surge)), vec![AlertKind::SellTargetHit, AlertKind::BullTargetHit]);

        let slump = HoldingSnapshot::new(nvda_in_profit(), 130.0);
        assert_eq!(kinds(&crossings(&cfg, &slump)), vec![AlertKind::StopLossHit, AlertKind::TrailingStopHit]);

        cfg.alert_on_bull_target = false;
        assert_eq!(kinds(&crossings(&cfg, &surge)), vec![AlertKind::SellTargetHit]);

        let flat = HoldingSnapshot::new(nvda_in_profit(), 151.0);
        assert!(crossings(&cfg, &flat).is_empty());
    }

    #[test]
    fn trigger_prices_are_the_registered_levels() {
        let cfg = AlertConfig::default();
        let holding = nvda_in_profit();
        let ladder = holding.ladder();

        let above = HoldingSnapshot::new(holding.clone(), 190.0);
        assert_eq!(crossings(&cfg, &above), vec![(AlertKind::SellTargetHit, ladder.sell_target)]);

        let below = HoldingSnapshot::new(holding, 135.0);
        assert_eq!(crossings(&cfg, &below), vec![(AlertKind::TrailingStopHit, ladder.trailing_stop)]);
    }

    #[test]
    fn underwater_position_crosses_its_stop() {
        let cfg = AlertConfig::default();
        let snapshot = HoldingSnapshot::new(nvda_underwater(), 100.0);
        assert_eq!(crossings(&cfg, &snapshot), vec![(AlertKind::StopLossHit, 120.0 * 0.88)]);

        let recovered = HoldingSnapshot::new(nvda_underwater(), 110.0);
        assert!(crossings(&cfg, &recovered).is_empty());
    }

    #[tokio::test]
    async fn rising_quote_fires_sell_then_bull_target() {
        let fx = fixture(AlertConfig { alert_on_bull_target: true, ..active_config() });
        fx.portfolio.register(vec![nvda_in_profit()]).await;

        fx.quotes.set("NVDA", 150.0);
        assert!(fx.monitor.run_tick().await.fired.is_empty());

        fx.quotes.set("NVDA", 190.0);
        let report = fx.monitor.run_tick().await;
        assert_eq!(report.fired.len(), 1);
        settle(report).await;

        // Still above the sell target (cooling down), now past the bull target too.
        fx.quotes.set("NVDA", 230.0);
        let report = fx.monitor.run_tick().await;
        assert_eq!(report.fired.len(), 1);
        settle(report).await;

        let sent = fx.channel.sent.lock();
        let fired: Vec<AlertKind> = sent.iter().map(|a| a.kind).collect();
        assert_eq!(fired, vec![AlertKind::SellTargetHit, AlertKind::BullTargetHit]);
        assert!((sent[0].trigger_price - 184.8528).abs() < 1e-4);
        assert_eq!(sent[1].current_price, 230.0);
    }

    #[tokio::test]
    async fn falling_quote_fires_trailing_stop() {
        let fx = fixture(AlertConfig { alert_on_stop_loss: false, ..active_config() });
        fx.portfolio
            .register(vec![Holding::new("AAPL", 5.0, 100.0, 1.0).with_reference_price(150.0)])
            .await;

        for price in [150.0, 140.0] {
            fx.quotes.set("AAPL", price);
            assert!(fx.monitor.run_tick().await.fired.is_empty());
        }

        fx.quotes.set("AAPL", 137.0);
        let report = fx.monitor.run_tick().await;
        assert_eq!(report.fired.len(), 1);
        settle(report).await;

        fx.quotes.set("AAPL", 101.0);
        assert!(fx.monitor.run_tick().await.fired.is_empty());

        let alerts = fx.monitor.dispatcher().alerts_snapshot(false).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::TrailingStopHit);
        assert!((alerts[0].trigger_price - 138.0).abs() < 1e-9);
        assert_eq!(alerts[0].current_price, 137.0);
    }

    #[tokio::test]
    async fn enabling_starts_scheduler_and_runs_immediately() {
        let fx = fixture(AlertConfig::default());
        fx.portfolio.register(vec![nvda_underwater()]).await;
        fx.quotes.set("NVDA", 100.0);

        fx.monitor.start().await;
        assert_eq!(fx.monitor.state().await, MonitorState::Idle);
        assert!(!fx.scheduler.is_running());

        fx.monitor
            .update_configuration(AlertConfigUpdate {
                recipient_address: Some("ops@example.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fx.monitor.state().await, MonitorState::Paused);
        assert!(!fx.scheduler.is_running());

        fx.monitor
            .update_configuration(AlertConfigUpdate { enabled: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(fx.monitor.state().await, MonitorState::Running);
        assert_eq!(fx.scheduler.period(), Some(Duration::from_millis(30_000)));

        // The immediate pass fired without any timer tick.
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 1);

        fx.monitor
            .update_configuration(AlertConfigUpdate { enabled: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(fx.monitor.state().await, MonitorState::Paused);
        assert!(!fx.scheduler.is_running());
        assert_eq!(fx.scheduler.advance(Duration::from_secs(600)).await, 0);
    }

    #[tokio::test]
    async fn status_stays_readable_during_the_immediate_pass() {
        let fx = fixture(AlertConfig {
            recipient_address: "ops@example.com".into(),
            ..AlertConfig::default()
        });
        fx.portfolio.register(vec![nvda_underwater()]).await;
        fx.quotes.set("NVDA", 100.0);
        let gate = fx.quotes.gated();

        let monitor = Arc::clone(&fx.monitor);
        let enabling = tokio::spawn(async move {
            monitor
                .update_configuration(AlertConfigUpdate { enabled: Some(true), ..Default::default() })
                .await
        });
        gate.entered.notified().await;

        let state = tokio::time::timeout(Duration::from_secs(1), fx.monitor.state())
            .await
            .expect("state readable while quotes are in flight");
        assert_eq!(state, MonitorState::Running);
        let status = tokio::time::timeout(Duration::from_secs(1), fx.monitor.status())
            .await
            .expect("status readable while quotes are in flight");
        assert_eq!(status.monitored_symbols, vec!["NVDA"]);

        gate.release.notify_one();
        enabling.await.unwrap().unwrap();
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 1);
    }

    #[tokio::test]
    async fn interval_change_while_running_reschedules() {
        let fx = fixture(active_config());
        fx.monitor.start().await;
        assert_eq!(fx.scheduler.starts(), 1);

        fx.monitor
            .update_configuration(AlertConfigUpdate {
                poll_interval_ms: Some(60_000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fx.scheduler.period(), Some(PollInterval::Slow.as_duration()));
        assert_eq!(fx.scheduler.starts(), 2);

        let persisted = fx.store.get(keys::CONFIG).unwrap().unwrap();
        assert!(persisted.contains("\"poll_interval_ms\":60000"));
    }

    #[tokio::test]
    async fn rejected_update_leaves_state_untouched() {
        let fx = fixture(AlertConfig::default());
        let err = fx
            .monitor
            .update_configuration(AlertConfigUpdate {
                enabled: Some(true),
                poll_interval_ms: Some(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedInterval(1));
        assert_eq!(fx.monitor.state().await, MonitorState::Idle);
        assert!(!fx.monitor.config().await.enabled);
    }

    #[tokio::test]
    async fn timer_ticks_respect_the_cooldown_window() {
        let fx = fixture(active_config());
        fx.portfolio.register(vec![nvda_underwater()]).await;
        fx.quotes.set("NVDA", 100.0);

        fx.monitor.start().await;
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 1);

        // Ten more ticks inside the window: nothing new.
        fx.clock.advance(ChronoDuration::hours(1));
        fx.scheduler.advance(Duration::from_secs(300)).await;
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 1);

        fx.clock.advance(ChronoDuration::hours(4));
        let report = fx.monitor.run_tick().await;
        assert_eq!(report.fired.len(), 1);
        settle(report).await;
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_symbol_is_skipped_and_others_evaluated() {
        let fx = fixture(active_config());
        fx.portfolio
            .register(vec![
                Holding::new("GONE", 1.0, 50.0, 1.0),
                nvda_underwater(),
                Holding::new("ZERO", 1.0, 50.0, 1.0),
            ])
            .await;
        fx.quotes.set("NVDA", 100.0);
        fx.quotes.set("ZERO", 0.0);

        let report = fx.monitor.run_tick().await;
        assert_eq!(report.skipped, vec!["GONE", "ZERO"]);
        assert_eq!(report.evaluated, 1);
        assert!((report.portfolio_value - 1_000.0).abs() < 1e-9);
        assert_eq!(report.fired.len(), 1);

        let outcomes = settle(report).await;
        assert!(matches!(outcomes[0], DispatchOutcome::Delivered { .. }));
        let sent = fx.channel.sent.lock();
        assert_eq!(sent[0].kind, AlertKind::StopLossHit);
        assert!((sent[0].portfolio_value - 1_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn enumeration_failure_keeps_loop_running() {
        let fx = fixture_with(active_config(), Some(Arc::new(BrokenPortfolio)));
        fx.monitor.start().await;

        assert_eq!(fx.monitor.state().await, MonitorState::Running);
        let report = fx.monitor.run_tick().await;
        assert!(report.fired.is_empty());
        assert!(fx.scheduler.is_running());
        assert_eq!(fx.scheduler.advance(Duration::from_secs(30)).await, 1);
    }

    #[tokio::test]
    async fn disabled_tick_is_a_no_op() {
        let fx = fixture(AlertConfig::default());
        fx.portfolio.register(vec![nvda_underwater()]).await;
        fx.quotes.set("NVDA", 100.0);

        let report = fx.monitor.run_tick().await;
        assert_eq!(report.evaluated, 0);
        assert!(fx.monitor.dispatcher().alerts_snapshot(false).await.is_empty());
    }

    #[tokio::test]
    async fn test_fire_resets_cooldown_and_fires() {
        let fx = fixture(active_config());
        fx.portfolio.register(vec![nvda_in_profit()]).await;
        fx.quotes.set("NVDA", 150.0);

        let (first, outcome) = fx.monitor.test_fire("nvda", AlertKind::SellTargetHit).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
        assert_eq!(first.kind, AlertKind::SellTargetHit);
        assert!((first.trigger_price - 184.85).abs() < 0.01);
        assert!(first.external_channel_sent);

        let (second, _) = fx.monitor.test_fire("NVDA", AlertKind::SellTargetHit).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(fx.monitor.dispatcher().alerts_snapshot(false).await.len(), 2);

        let missing = fx.monitor.test_fire("MSFT", AlertKind::SellTargetHit).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fire_surfaces_quote_failure() {
        let fx = fixture(active_config());
        fx.portfolio.register(vec![nvda_in_profit()]).await;

        let err = fx.monitor.test_fire("NVDA", AlertKind::StopLossHit).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn status_reports_degradation_flags() {
        let fx = fixture(AlertConfig { enabled: true, ..AlertConfig::default() });
        fx.portfolio.register(vec![Holding::new("AAPL", 1.0, 100.0, 1.0)]).await;
        fx.monitor.start().await;
        fx.clock.advance(ChronoDuration::seconds(90));

        let status = fx.monitor.status().await;
        assert_eq!(status.state, MonitorState::Running);
        assert!(!status.recipient_configured);
        assert!(status.external_channel_configured);
        assert_eq!(status.external_provider, "recording");
        assert_eq!(status.monitored_symbols, vec!["AAPL"]);
        assert_eq!(status.uptime_seconds, 90);
        assert_eq!(status.poll_interval_ms, 30_000);
        assert_eq!(status.cooldown_hours, 4);
    }
}
