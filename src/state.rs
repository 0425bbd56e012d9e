//! # state
//!
//! The shared application state injected into every Axum handler, and the
//! wiring that builds it from [`Settings`].
//!
//! ```text
//!   AppState
//!    ├─ monitor     Arc<Monitor>            loop state machine + tick
//!    ├─ dispatcher  Arc<Dispatcher>         cooldowns, alert store, delivery log
//!    ├─ portfolio   Arc<PortfolioRegistry>  holdings pushed by the dashboard
//!    ├─ quotes      Arc<dyn QuoteSource>    live prices for the holdings view
//!    └─ events      EventBus                /ws/alerts fan-out
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AlertConfig, Settings};
use crate::engine::{Dispatcher, Monitor, Scheduler, TokioScheduler};
use crate::events::EventBus;
use crate::services::{
    AlertChannel, DisabledChannel, FallbackChannel, FinnhubQuotes, HoldingSource,
    PortfolioRegistry, QuoteSource, SendGridChannel, SmtpChannel,
};
use crate::store::kv::{keys, load_json};
use crate::store::{FileStore, KeyValueStore, MemoryStore};

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub monitor:    Arc<Monitor>,
    pub dispatcher: Arc<Dispatcher>,
    pub portfolio:  Arc<PortfolioRegistry>,
    pub quotes:     Arc<dyn QuoteSource>,
    pub events:     EventBus,
}

pub type SharedState = Arc<AppState>;

/// Collaborators and infrastructure the state is assembled from.  Tests
/// substitute fakes; [`build_state`] uses the live implementations.
pub struct Components {
    pub store:           Arc<dyn KeyValueStore>,
    pub channel:         Arc<dyn AlertChannel>,
    pub quotes:          Arc<dyn QuoteSource>,
    pub scheduler:       Arc<dyn Scheduler>,
    pub clock:           Arc<dyn Clock>,
    pub cooldown_window: chrono::Duration,
}

impl AppState {
    pub fn assemble(components: Components) -> SharedState {
        let Components { store, channel, quotes, scheduler, clock, cooldown_window } = components;

        let config = Arc::new(RwLock::new(load_alert_config(store.as_ref())));
        let events = EventBus::new();
        let portfolio = Arc::new(PortfolioRegistry::new());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&config),
            channel,
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&clock),
            cooldown_window,
        ));

        let holdings: Arc<dyn HoldingSource> = portfolio.clone();
        let monitor = Monitor::new(
            config,
            Arc::clone(&dispatcher),
            holdings,
            Arc::clone(&quotes),
            scheduler,
            store,
            events.clone(),
            clock,
        );

        Arc::new(Self { monitor, dispatcher, portfolio, quotes, events })
    }
}

fn load_alert_config(store: &dyn KeyValueStore) -> AlertConfig {
    match load_json::<AlertConfig>(store, keys::CONFIG) {
        Ok(Some(config)) => {
            info!(enabled = config.enabled, "Restored alert configuration");
            config
        }
        Ok(None) => AlertConfig::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read alert configuration, using defaults");
            AlertConfig::default()
        }
    }
}

/// Wire the live collaborators from process settings.
pub fn build_state(settings: &Settings) -> anyhow::Result<SharedState> {
    let store: Arc<dyn KeyValueStore> = match &settings.state_file {
        Some(path) => {
            let store = FileStore::open(path).with_context(|| format!("opening state file {path}"))?;
            info!(path = %store.path().display(), "💾 State file opened");
            Arc::new(store)
        }
        None => {
            warn!("STATE_FILE=memory, alert state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let http = reqwest::Client::new();

    let channel = build_channel(settings, &http)?;

    let quotes = FinnhubQuotes::new(http, &settings.quote_base_url, &settings.quote_api_key);
    if !quotes.has_key() {
        warn!("QUOTE_API_KEY not set, every symbol will be skipped");
    }

    Ok(AppState::assemble(Components {
        store,
        channel,
        quotes:          Arc::new(quotes),
        scheduler:       Arc::new(TokioScheduler::new()),
        clock:           Arc::new(SystemClock),
        cooldown_window: settings.cooldown_window,
    }))
}

/// SendGrid first, SMTP as fallback; whichever are configured.
fn build_channel(settings: &Settings, http: &reqwest::Client) -> anyhow::Result<Arc<dyn AlertChannel>> {
    let mut chain: Vec<Arc<dyn AlertChannel>> = Vec::new();

    if !settings.sendgrid_api_key.trim().is_empty() {
        chain.push(Arc::new(SendGridChannel::new(
            http.clone(),
            &settings.sendgrid_base_url,
            &settings.sendgrid_api_key,
            &settings.sendgrid_from,
            &settings.sendgrid_from_name,
        )));
    }
    if settings.smtp.is_configured() {
        chain.push(Arc::new(
            SmtpChannel::new(&settings.smtp, &settings.sendgrid_from_name)
                .context("configuring the SMTP fallback")?,
        ));
    }

    let providers: Vec<&str> = chain.iter().map(|c| c.provider()).collect();
    Ok(match chain.len() {
        0 => {
            warn!("Neither SENDGRID_API_KEY nor SMTP credentials set, alerts stay in-app only");
            Arc::new(DisabledChannel)
        }
        1 => {
            info!(?providers, "External alert channel ready");
            chain.remove(0)
        }
        _ => {
            info!(?providers, "External alert channel ready with fallback");
            Arc::new(FallbackChannel::new(chain))
        }
    })
}
