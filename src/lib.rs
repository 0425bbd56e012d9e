//! # alert-agent
//!
//! Watches a portfolio of holdings, derives a target ladder per holding from
//! live quotes, and raises cooldown-deduplicated alerts when a price crosses
//! a threshold.  Alerts land in an in-app store and, when configured, go out
//! through an external channel whose every attempt is audited.
//!
//! ```text
//!   Scheduler ──tick──▶ Monitor ──crossings──▶ Dispatcher ──▶ AlertStore
//!                         │                       │
//!                  HoldingSource             AlertChannel ──▶ DeliveryLog
//!                  QuoteSource                    │
//!                                             EventBus ──▶ /ws/alerts
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
