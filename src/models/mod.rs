//! Domain models shared across the alert agent.

pub mod alert;
pub mod holding;

pub use alert::{Alert, AlertKind, DeliveryLogEntry, Severity};
pub use holding::{Holding, HoldingSnapshot};
