//! # models::alert
//!
//! Defines the surfaced [`Alert`] and the [`DeliveryLogEntry`] audit row.
//!
//! ## Why two records?
//! `Alert`            = what the dashboard shows (always created on a firing)
//! `DeliveryLogEntry` = one row per external-channel attempt, success or not

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── AlertKind ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    SellTargetHit,
    StopLossHit,
    TrailingStopHit,
    BullTargetHit,
    /// Never produced by the monitor tick; kept so stored alerts and the
    /// configuration surface round-trip.
    DailySummary,
}

impl AlertKind {
    pub const ALL: [AlertKind; 5] = [
        AlertKind::SellTargetHit,
        AlertKind::StopLossHit,
        AlertKind::TrailingStopHit,
        AlertKind::BullTargetHit,
        AlertKind::DailySummary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::SellTargetHit   => "SELL_TARGET_HIT",
            AlertKind::StopLossHit     => "STOP_LOSS_HIT",
            AlertKind::TrailingStopHit => "TRAILING_STOP_HIT",
            AlertKind::BullTargetHit   => "BULL_TARGET_HIT",
            AlertKind::DailySummary    => "DAILY_SUMMARY",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            AlertKind::StopLossHit     => Severity::Critical,
            AlertKind::TrailingStopHit => Severity::Warning,
            AlertKind::SellTargetHit   => Severity::Success,
            AlertKind::BullTargetHit   => Severity::Success,
            AlertKind::DailySummary    => Severity::Info,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        AlertKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown alert kind '{s}'"))
    }
}

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Presentation-only classification, derived from [`AlertKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Success,
}

// ─── Alert ────────────────────────────────────────────────────────────────────

/// One surfaced alert.  After creation only `acknowledged` and
/// `external_channel_sent` ever change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// UUIDv7, so ids sort in firing order.
    pub id:                    Uuid,
    pub timestamp:             DateTime<Utc>,
    pub kind:                  AlertKind,
    pub symbol:                String,
    pub message:               String,
    pub trigger_price:         f64,
    pub current_price:         f64,
    pub severity:              Severity,
    #[serde(default)]
    pub acknowledged:          bool,
    #[serde(default)]
    pub external_channel_sent: bool,
}

impl Alert {
    pub fn new(
        kind:          AlertKind,
        symbol:        &str,
        message:       String,
        trigger_price: f64,
        current_price: f64,
        timestamp:     DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            kind,
            symbol: symbol.to_string(),
            message,
            trigger_price,
            current_price,
            severity: kind.severity(),
            acknowledged: false,
            external_channel_sent: false,
        }
    }
}

// ─── DeliveryLogEntry ─────────────────────────────────────────────────────────

/// Audit row for one external-channel attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id:            Uuid,
    pub timestamp:     DateTime<Utc>,
    pub kind:          AlertKind,
    pub symbol:        String,
    pub recipient:     String,
    pub trigger_price: f64,
    pub current_price: f64,
    pub sent:          bool,
    #[serde(default)]
    pub error:         Option<String>,
    /// Provider that handled the attempt, `"none"` when un-configured.
    pub provider:      String,
}
