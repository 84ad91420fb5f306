//! Per-segment periodic tickers.
//!
//! Every live segment owns exactly one ticker. With [`TickDriver::Runtime`] a
//! ticker is a tokio task that wakes up once per tick period and runs one
//! allocation pass for its segment. With [`TickDriver::Manual`] no task is spawned
//! and the host calls [`FluidManager::tick_all`] from its own game loop.

use std::{sync::Weak, time::Duration};

use rustc_hash::FxHashMap;
use tokio::{
    runtime::Handle,
    select,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::network::{FluidManager, SegmentId};

/// How segment tickers are driven.
#[derive(Debug, Clone)]
pub enum TickDriver {
    /// Spawn one task per segment on this runtime.
    Runtime(Handle),
    /// Don't spawn anything; the host calls [`FluidManager::tick_all`] itself.
    Manual,
}

/// The set of running tickers, one per live segment.
pub(crate) struct Tickers {
    driver: TickDriver,
    period: Duration,
    manager: Weak<FluidManager>,
    /// Parent of every ticker's token. Cancelled on shutdown.
    cancel_token: CancellationToken,
    /// Tracks the spawned tasks so shutdown can wait for them.
    tasks: TaskTracker,
    active: FxHashMap<SegmentId, CancellationToken>,
}

impl Tickers {
    pub(crate) fn new(driver: TickDriver, period: Duration, manager: Weak<FluidManager>) -> Self {
        Self {
            driver,
            period,
            manager,
            cancel_token: CancellationToken::new(),
            tasks: TaskTracker::new(),
            active: FxHashMap::default(),
        }
    }

    /// Starts the ticker for `segment`.
    ///
    /// # Panics
    /// Panics if the segment already has a ticker.
    pub(crate) fn start(&mut self, segment: SegmentId) {
        assert!(
            !self.active.contains_key(&segment),
            "Ticker already active for segment {segment}"
        );

        let token = self.cancel_token.child_token();
        if let TickDriver::Runtime(handle) = &self.driver {
            self.tasks.spawn_on(
                run_ticker(self.manager.clone(), segment, self.period, token.clone()),
                handle,
            );
        }
        self.active.insert(segment, token);
        log::debug!("Started ticker for segment {segment}");
    }

    /// Stops the ticker for `segment`. A tick that is already running finishes,
    /// no further tick starts.
    ///
    /// # Panics
    /// Panics if the segment has no ticker.
    pub(crate) fn stop(&mut self, segment: SegmentId) {
        let Some(token) = self.active.remove(&segment) else {
            panic!("Ticker does not exist for segment {segment}");
        };
        token.cancel();
        log::debug!("Stopped ticker for segment {segment}");
    }

    pub(crate) fn contains(&self, segment: SegmentId) -> bool {
        self.active.contains_key(&segment)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.active.len()
    }

    /// Cancels every ticker, including ones started later, and hands back the
    /// tracker to wait on.
    pub(crate) fn shutdown(&self) -> TaskTracker {
        self.cancel_token.cancel();
        self.tasks.close();
        self.tasks.clone()
    }
}

impl Drop for Tickers {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run_ticker(
    manager: Weak<FluidManager>,
    segment: SegmentId,
    period: Duration,
    cancel_token: CancellationToken,
) {
    // The first tick happens one full period after the segment appears
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            () = cancel_token.cancelled() => {
                break;
            }
            _ = interval.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.tick_segment(segment);
            }
        }
    }
}
