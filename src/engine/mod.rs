//! The alert core: ladder math, cooldowns, message templates, the dispatch
//! pipeline and the monitoring loop that drives it.

pub mod cooldown;
pub mod dispatch;
pub mod ladder;
pub mod monitor;
pub mod scheduler;
pub mod templates;

pub use cooldown::CooldownRegistry;
pub use dispatch::{Admitted, DispatchOutcome, DispatchRequest, Dispatcher};
pub use ladder::{compute_ladder, TargetLadder};
pub use monitor::{crossings, Monitor, MonitorState, MonitorStatus, TickReport};
pub use scheduler::{ManualScheduler, Scheduler, TickFn, TokioScheduler};
