//! # engine::scheduler
//!
//! The recurring-task seam behind the monitoring loop.
//!
//! ```text
//!   start(period, tick) ──▶ first tick after one full period, then every period
//!   reschedule(period)  ──▶ tear down + restart with the same tick fn
//!   stop()              ──▶ cancel the pending timer only
//! ```
//!
//! Stopping never cancels a tick that is already running: each tick runs as
//! its own task, so in-flight work (and any external send it started)
//! completes and still logs its result.
//!
//! [`TokioScheduler`] drives live runs.  [`ManualScheduler`] holds a virtual
//! timer that tests move forward with [`ManualScheduler::advance`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// One unit of recurring work.  Called once per period.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// `tokio::time::interval` panics on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub trait Scheduler: Send + Sync {
    /// Start ticking.  Replaces any timer that is already running.
    fn start(&self, period: Duration, tick: TickFn);

    /// Cancel the pending timer.  No-op when stopped.
    fn stop(&self);

    /// Restart the running timer with a new period.  No-op when stopped.
    fn reschedule(&self, period: Duration);

    fn is_running(&self) -> bool;

    /// Current period, `None` when stopped.
    fn period(&self) -> Option<Duration>;
}

// ─── TokioScheduler ───────────────────────────────────────────────────────────

#[derive(Default)]
struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    tick:   Option<TickFn>,
    period: Option<Duration>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Interval timer on the tokio runtime.  Must be started from within a
/// runtime context.
#[derive(Default)]
pub struct TokioScheduler {
    slot: Mutex<TimerSlot>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_timer(period: Duration, tick: TickFn) -> JoinHandle<()> {
        let period = period.max(MIN_PERIOD);
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tokio::spawn(tick());
            }
        })
    }
}

impl Scheduler for TokioScheduler {
    fn start(&self, period: Duration, tick: TickFn) {
        let mut slot = self.slot.lock();
        slot.cancel();
        slot.handle = Some(Self::spawn_timer(period, Arc::clone(&tick)));
        slot.tick = Some(tick);
        slot.period = Some(period);
        debug!(period_ms = period.as_millis() as u64, "⏱  Scheduler started");
    }

    fn stop(&self) {
        let mut slot = self.slot.lock();
        if slot.handle.is_some() {
            slot.cancel();
            slot.period = None;
            debug!("⏱  Scheduler stopped");
        }
    }

    fn reschedule(&self, period: Duration) {
        let mut slot = self.slot.lock();
        let Some(tick) = slot.tick.clone() else {
            return;
        };
        if slot.handle.is_none() {
            return;
        }
        slot.cancel();
        slot.handle = Some(Self::spawn_timer(period, tick));
        slot.period = Some(period);
        debug!(period_ms = period.as_millis() as u64, "⏱  Scheduler rescheduled");
    }

    fn is_running(&self) -> bool {
        self.slot.lock().handle.is_some()
    }

    fn period(&self) -> Option<Duration> {
        self.slot.lock().period
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.slot.get_mut().cancel();
    }
}

// ─── ManualScheduler ──────────────────────────────────────────────────────────

#[derive(Default)]
struct VirtualTimer {
    tick:    Option<TickFn>,
    period:  Option<Duration>,
    /// Time accumulated since the last tick (or since start).
    elapsed: Duration,
    starts:  usize,
}

/// Virtual timer.  Nothing happens until [`advance`](Self::advance) is called.
#[derive(Default)]
pub struct ManualScheduler {
    timer: Mutex<VirtualTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward and run every tick that falls due, in order.
    /// Returns the number of ticks run.
    pub async fn advance(&self, by: Duration) -> usize {
        let (tick, due) = {
            let mut timer = self.timer.lock();
            let (Some(tick), Some(period)) = (timer.tick.clone(), timer.period) else {
                return 0;
            };
            let period = period.max(MIN_PERIOD);
            timer.elapsed += by;
            let due = (timer.elapsed.as_nanos() / period.as_nanos()) as usize;
            timer.elapsed = Duration::from_nanos((timer.elapsed.as_nanos() % period.as_nanos()) as u64);
            (tick, due)
        };

        for _ in 0..due {
            tick().await;
        }
        due
    }

    /// How many times the timer was (re)started.
    pub fn starts(&self) -> usize {
        self.timer.lock().starts
    }
}

impl Scheduler for ManualScheduler {
    fn start(&self, period: Duration, tick: TickFn) {
        let mut timer = self.timer.lock();
        timer.tick = Some(tick);
        timer.period = Some(period);
        timer.elapsed = Duration::ZERO;
        timer.starts += 1;
    }

    fn stop(&self) {
        let mut timer = self.timer.lock();
        timer.period = None;
        timer.elapsed = Duration::ZERO;
    }

    fn reschedule(&self, period: Duration) {
        let mut timer = self.timer.lock();
        if timer.period.is_some() {
            timer.period = Some(period);
            timer.elapsed = Duration::ZERO;
            timer.starts += 1;
        }
    }

    fn is_running(&self) -> bool {
        self.timer.lock().period.is_some()
    }

    fn period(&self) -> Option<Duration> {
        self.timer.lock().period
    }
}
