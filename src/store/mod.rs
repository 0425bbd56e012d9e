//! In-process state owned by the alert agent, plus its persistence seam.

pub mod alerts;
pub mod delivery_log;
pub mod kv;

pub use alerts::{AlertStore, MAX_ALERTS};
pub use delivery_log::{DeliveryLog, MAX_DELIVERY_LOG};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
