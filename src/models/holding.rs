//! # models::holding
//!
//! [`Holding`] is owned by the portfolio collaborator and read-only here.
//! Its target ladder is anchored on the reference price the collaborator
//! reported with the holding (average cost when none was given), so the
//! thresholds stay put while the live quote moves through them.
//!
//! [`HoldingSnapshot`] pins one holding to the price observed during a tick.
//! Market value and P&L follow the live price; the ladder does not.

use serde::{Deserialize, Serialize};

use crate::engine::ladder::{compute_ladder, gain_loss_pct, TargetLadder};

fn default_beta() -> f64 {
    1.0
}

/// One position as enumerated by the portfolio collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol:       String,
    pub shares:       f64,
    /// Volume-weighted across adds by the portfolio collaborator.
    pub average_cost: f64,
    #[serde(default = "default_beta")]
    pub beta:         f64,
    /// Price the collaborator computed the targets at.
    #[serde(default, alias = "current_price", skip_serializing_if = "Option::is_none")]
    pub reference_price: Option<f64>,
}

impl Holding {
    pub fn new(symbol: &str, shares: f64, average_cost: f64, beta: f64) -> Self {
        Self {
            symbol: symbol.trim().to_ascii_uppercase(),
            shares,
            average_cost,
            beta,
            reference_price: None,
        }
    }

    pub fn with_reference_price(mut self, price: f64) -> Self {
        self.reference_price = Some(price);
        self
    }

    /// The price the ladder is computed from.
    pub fn anchor_price(&self) -> f64 {
        self.reference_price.unwrap_or(self.average_cost)
    }

    pub fn ladder(&self) -> TargetLadder {
        compute_ladder(self.anchor_price(), self.average_cost, self.beta)
    }

    /// Inputs the ladder calculator can work with.
    pub fn is_valid(&self) -> bool {
        !self.symbol.trim().is_empty()
            && self.shares.is_finite()
            && self.shares > 0.0
            && self.average_cost.is_finite()
            && self.average_cost > 0.0
            && self.beta.is_finite()
            && self.reference_price.map_or(true, |p| p.is_finite() && p > 0.0)
    }
}

/// A holding paired with the live price read for this evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingSnapshot {
    #[serde(flatten)]
    pub holding:       Holding,
    pub current_price: f64,
}

impl HoldingSnapshot {
    pub fn new(holding: Holding, current_price: f64) -> Self {
        Self { holding, current_price }
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.holding.symbol
    }

    pub fn market_value(&self) -> f64 {
        self.holding.shares * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.holding.shares * self.holding.average_cost
    }

    pub fn gain_loss(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }

    pub fn gain_loss_pct(&self) -> f64 {
        gain_loss_pct(self.current_price, self.holding.average_cost)
    }

    /// The holding's thresholds, independent of this tick's price.
    pub fn ladder(&self) -> TargetLadder {
        self.holding.ladder()
    }
}
