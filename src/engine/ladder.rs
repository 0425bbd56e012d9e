//! # engine::ladder
//!
//! **Target Ladder Calculator**: pure, deterministic, no failure modes.
//!
//! ```text
//! gain/loss %  ──▶ momentum  (>20%: 1.06 | <-10%: 0.96 | else 1.00)
//!     │
//!     ├─ in profit  → sell = price × (1 + (0.14 + β·0.04) × momentum)
//!     │               stop = price × (1 − (0.07 + β·0.025))
//!     └─ at/below cost → sell = cost × 1.06,  stop = cost × 0.88
//!
//! conservative = sell × 0.87   bull = sell × 1.22   trailing = price × 0.92
//! ```
//!
//! Callers sanitise inputs; this module assumes positive finite prices.

use serde::Serialize;

// ─── Constants ────────────────────────────────────────────────────────────────

const STRONG_GAIN_PCT: f64 = 20.0;
const DEEP_LOSS_PCT:   f64 = -10.0;

const MOMENTUM_STRONG:  f64 = 1.06;
const MOMENTUM_WEAK:    f64 = 0.96;
const MOMENTUM_NEUTRAL: f64 = 1.00;

const SELL_BASE:   f64 = 0.14;
const SELL_BETA:   f64 = 0.04;
const STOP_BASE:   f64 = 0.07;
const STOP_BETA:   f64 = 0.025;

const UNDERWATER_SELL: f64 = 1.06;
const UNDERWATER_STOP: f64 = 0.88;

const CONSERVATIVE_RATIO: f64 = 0.87;
const BULL_RATIO:         f64 = 1.22;
const TRAILING_RATIO:     f64 = 0.92;

// ─── TargetLadder ─────────────────────────────────────────────────────────────

/// The five trigger prices for one holding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetLadder {
    pub sell_target:         f64,
    pub stop_loss:           f64,
    pub conservative_target: f64,
    pub bull_target:         f64,
    pub trailing_stop:       f64,
}

#[inline]
pub fn gain_loss_pct(current_price: f64, average_cost: f64) -> f64 {
    (current_price - average_cost) / average_cost * 100.0
}

fn momentum(gain_loss_pct: f64) -> f64 {
    if gain_loss_pct > STRONG_GAIN_PCT {
        MOMENTUM_STRONG
    } else if gain_loss_pct < DEEP_LOSS_PCT {
        MOMENTUM_WEAK
    } else {
        MOMENTUM_NEUTRAL
    }
}

/// Derive the ladder from the price the holding was valued at, its cost
/// basis and beta.
///
/// An underwater (or flat) position is anchored to its cost basis instead of
/// the depressed price.
pub fn compute_ladder(current_price: f64, average_cost: f64, beta: f64) -> TargetLadder {
    let pct = gain_loss_pct(current_price, average_cost);
    let momentum = momentum(pct);

    let (sell_target, stop_loss) = if pct > 0.0 {
        (
            current_price * (1.0 + (SELL_BASE + beta * SELL_BETA) * momentum),
            current_price * (1.0 - (STOP_BASE + beta * STOP_BETA)),
        )
    } else {
        (average_cost * UNDERWATER_SELL, average_cost * UNDERWATER_STOP)
    };

    TargetLadder {
        sell_target,
        stop_loss,
        conservative_target: sell_target * CONSERVATIVE_RATIO,
        bull_target:         sell_target * BULL_RATIO,
        trailing_stop:       current_price * TRAILING_RATIO,
    }
}
