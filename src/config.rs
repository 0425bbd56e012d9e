//! # config
//!
//! Two layers of configuration:
//!
//! - [`Settings`]: process settings read once from the environment.
//! - [`AlertConfig`]: operator-controlled alert configuration, persisted in
//!   the key/value store and read by the monitor on every tick.
//!
//! ## Environment Variables
//!
//! | Variable               | Default                      |
//! |------------------------|------------------------------|
//! | `BIND_ADDR`            | `0.0.0.0:3000`               |
//! | `STATE_FILE`           | `alert_agent_state.json` (`memory` = no file) |
//! | `QUOTE_BASE_URL`       | `https://finnhub.io/api/v1`  |
//! | `QUOTE_API_KEY`        | *(empty)*                    |
//! | `SENDGRID_API_KEY`     | *(empty: channel off)*      |
//! | `SENDGRID_FROM_EMAIL`  | `alerts@localhost`           |
//! | `SENDGRID_FROM_NAME`   | `Portfolio Alert Agent`      |
//! | `SENDGRID_BASE_URL`    | `https://api.sendgrid.com`   |
//! | `SMTP_HOST`            | *(empty: fallback off)*      |
//! | `SMTP_PORT`            | `587`                        |
//! | `SMTP_USERNAME`        | *(empty)*                    |
//! | `SMTP_PASSWORD`        | *(empty)*                    |
//! | `SMTP_FROM_EMAIL`      | `SMTP_USERNAME`              |
//! | `SMTP_USE_TLS`         | `true` (STARTTLS)            |
//! | `ALERT_COOLDOWN_HOURS` | `4` (positive whole hours)   |

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::engine::cooldown::DEFAULT_COOLDOWN_HOURS;
use crate::error::ConfigError;

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr:          String,
    /// `None` keeps persisted state in memory only.
    pub state_file:         Option<String>,
    pub quote_base_url:     String,
    pub quote_api_key:      String,
    pub sendgrid_api_key:   String,
    pub sendgrid_from:      String,
    pub sendgrid_from_name: String,
    pub sendgrid_base_url:  String,
    pub smtp:               SmtpSettings,
    pub cooldown_window:    chrono::Duration,
}

/// Credentials for the SMTP fallback channel.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host:       String,
    pub port:       u16,
    pub username:   String,
    pub password:   String,
    pub from_email: String,
    /// STARTTLS when `true`; plain connection otherwise.
    pub use_tls:    bool,
}

impl SmtpSettings {
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }

    fn from_env() -> anyhow::Result<Self> {
        let port = env_or("SMTP_PORT", "587")
            .trim()
            .parse()
            .context("SMTP_PORT must be a port number")?;
        let use_tls = match env_or("SMTP_USE_TLS", "true").trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => anyhow::bail!("SMTP_USE_TLS must be true or false, got '{other}'"),
        };
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();

        Ok(Self {
            host:       std::env::var("SMTP_HOST").unwrap_or_default(),
            port,
            from_email: env_or("SMTP_FROM_EMAIL", &username),
            username,
            password:   std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            use_tls,
        })
    }
}

/// Parse `ALERT_COOLDOWN_HOURS`.  Zero or negative would switch
/// deduplication off, so both are rejected along with overflowing values.
pub fn parse_cooldown_window(raw: &str) -> anyhow::Result<chrono::Duration> {
    let hours: i64 = raw
        .trim()
        .parse()
        .context("ALERT_COOLDOWN_HOURS must be a whole number of hours")?;
    if hours <= 0 {
        anyhow::bail!("ALERT_COOLDOWN_HOURS must be at least 1, got {hours}");
    }
    chrono::Duration::try_hours(hours)
        .with_context(|| format!("ALERT_COOLDOWN_HOURS={hours} is out of range"))
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let cooldown_window = parse_cooldown_window(&env_or(
            "ALERT_COOLDOWN_HOURS",
            &DEFAULT_COOLDOWN_HOURS.to_string(),
        ))?;

        let state_file = match env_or("STATE_FILE", "alert_agent_state.json") {
            s if s.eq_ignore_ascii_case("memory") => None,
            s => Some(s),
        };

        Ok(Self {
            bind_addr:          env_or("BIND_ADDR", "0.0.0.0:3000"),
            state_file,
            quote_base_url:     env_or("QUOTE_BASE_URL", "https://finnhub.io/api/v1"),
            quote_api_key:      std::env::var("QUOTE_API_KEY").unwrap_or_default(),
            sendgrid_api_key:   std::env::var("SENDGRID_API_KEY").unwrap_or_default(),
            sendgrid_from:      env_or("SENDGRID_FROM_EMAIL", "alerts@localhost"),
            sendgrid_from_name: env_or("SENDGRID_FROM_NAME", "Portfolio Alert Agent"),
            sendgrid_base_url:  env_or("SENDGRID_BASE_URL", "https://api.sendgrid.com"),
            smtp:               SmtpSettings::from_env()?,
            cooldown_window,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ─── PollInterval ─────────────────────────────────────────────────────────────

/// The enumerated polling cadences.  Serialized as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum PollInterval {
    Fast,
    #[default]
    Normal,
    Slow,
    Relaxed,
}

impl PollInterval {
    pub const ALL: [PollInterval; 4] = [
        PollInterval::Fast,
        PollInterval::Normal,
        PollInterval::Slow,
        PollInterval::Relaxed,
    ];

    pub fn as_millis(self) -> u64 {
        match self {
            PollInterval::Fast    => 15_000,
            PollInterval::Normal  => 30_000,
            PollInterval::Slow    => 60_000,
            PollInterval::Relaxed => 300_000,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = ConfigError;

    fn try_from(ms: u64) -> Result<Self, Self::Error> {
        PollInterval::ALL
            .into_iter()
            .find(|p| p.as_millis() == ms)
            .ok_or(ConfigError::UnsupportedInterval(ms))
    }
}

impl From<PollInterval> for u64 {
    fn from(p: PollInterval) -> Self {
        p.as_millis()
    }
}

// ─── AlertConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled:                bool,
    /// Empty = external channel disabled.
    pub recipient_address:      String,
    #[serde(rename = "poll_interval_ms")]
    pub poll_interval:          PollInterval,
    pub alert_on_sell_target:   bool,
    pub alert_on_stop_loss:     bool,
    pub alert_on_trailing_stop: bool,
    pub alert_on_bull_target:   bool,
    /// Stored for the dashboard; never evaluated by the monitor.
    pub send_daily_summary:     bool,
    pub daily_summary_time:     String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled:                false,
            recipient_address:      String::new(),
            poll_interval:          PollInterval::default(),
            alert_on_sell_target:   true,
            alert_on_stop_loss:     true,
            alert_on_trailing_stop: true,
            alert_on_bull_target:   false,
            send_daily_summary:     false,
            daily_summary_time:     "16:00".to_string(),
        }
    }
}

impl AlertConfig {
    pub fn has_recipient(&self) -> bool {
        !self.recipient_address.trim().is_empty()
    }

    /// External delivery is attempted only when both hold.
    pub fn external_channel_active(&self) -> bool {
        self.enabled && self.has_recipient()
    }

    /// Apply a partial update.  Validation happens before any field is
    /// touched, so a rejected update leaves the config unchanged.
    pub fn apply(&mut self, update: AlertConfigUpdate) -> Result<(), ConfigError> {
        let poll_interval = update
            .poll_interval_ms
            .map(PollInterval::try_from)
            .transpose()?;
        if let Some(time) = &update.daily_summary_time {
            validate_summary_time(time)?;
        }

        if let Some(v) = update.enabled                { self.enabled = v; }
        if let Some(v) = update.recipient_address      { self.recipient_address = v.trim().to_string(); }
        if let Some(v) = poll_interval                 { self.poll_interval = v; }
        if let Some(v) = update.alert_on_sell_target   { self.alert_on_sell_target = v; }
        if let Some(v) = update.alert_on_stop_loss     { self.alert_on_stop_loss = v; }
        if let Some(v) = update.alert_on_trailing_stop { self.alert_on_trailing_stop = v; }
        if let Some(v) = update.alert_on_bull_target   { self.alert_on_bull_target = v; }
        if let Some(v) = update.send_daily_summary     { self.send_daily_summary = v; }
        if let Some(v) = update.daily_summary_time     { self.daily_summary_time = v; }
        Ok(())
    }
}

fn validate_summary_time(time: &str) -> Result<(), ConfigError> {
    chrono::NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSummaryTime(time.to_string()))
}

/// Partial configuration update; `None` leaves a field as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertConfigUpdate {
    pub enabled:                Option<bool>,
    pub recipient_address:      Option<String>,
    pub poll_interval_ms:       Option<u64>,
    pub alert_on_sell_target:   Option<bool>,
    pub alert_on_stop_loss:     Option<bool>,
    pub alert_on_trailing_stop: Option<bool>,
    pub alert_on_bull_target:   Option<bool>,
    pub send_daily_summary:     Option<bool>,
    pub daily_summary_time:     Option<String>,
}
