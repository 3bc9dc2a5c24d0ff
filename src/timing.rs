//! Time sources for the session controller.
//!
//! `Clock` answers "what time is it" for background accounting, and
//! `Scheduler` drives the 1-second countdown and pause-allowance ticks.
//! Both sit behind traits so tests can step time by hand.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::debug;
use tokio::{
    runtime::Handle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to a repeating task. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct TickHandle {
    token: CancellationToken,
}

impl TickHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub trait Scheduler: Send + Sync {
    /// Runs `callback` every `interval`, first firing one interval from now.
    fn schedule_repeating(&self, interval: Duration, callback: TickCallback) -> TickHandle;
}

/// Spawns one tokio task per repeating schedule.
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn current() -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|err| anyhow!("no tokio runtime available: {err}"))?;
        Ok(Self::new(runtime))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, callback: TickCallback) -> TickHandle {
        let handle = TickHandle::new();
        let token = handle.token();

        self.runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        callback();
                    }
                }
            }

            debug!("repeating task stopped");
        });

        handle
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_ticks_until_cancelled() {
        let scheduler = TokioScheduler::current().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let handle = scheduler.schedule_repeating(
            Duration::from_secs(1),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        handle.cancel();
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_interval() {
        let scheduler = TokioScheduler::current().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let _handle = scheduler.schedule_repeating(
            Duration::from_secs(1),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_scheduler_skips_cancelled_tasks() {
        let scheduler = testing::ManualScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handle = scheduler.schedule_repeating(
            Duration::from_secs(1),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scheduler.fire_times(2);
        handle.cancel();
        scheduler.fire();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.active_count(), 0);
    }
}
