//! Global pacing of outbound calls.
//!
//! The `Pacer` hands out execution instants spaced at least `min_interval`
//! apart. Each new instant is computed from the last *scheduled* instant, not
//! from the arrival time of the caller, so a burst of N admissions is spread
//! over `(N - 1) * min_interval` no matter how it arrives. Admissions are never
//! dropped; they are only delayed. A bounded pool of slots caps how many
//! actions may be waiting or running at once.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::{mlog_trace, Error, Result};

/// Time source for the pacer.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Reads tokio's clock, which honors `tokio::time::pause` in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Where and when an admitted action was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Instant the action is due to start.
    pub at: Instant,
    /// Delay relative to the moment of admission.
    pub delay: Duration,
}

/// Rate limiter shared by every dispatch path that must respect one spacing.
pub struct Pacer {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    last_scheduled: Mutex<Option<Instant>>,
    slots: Arc<Semaphore>,
    max_scheduled: usize,
}

impl Pacer {
    pub fn new(min_interval: Duration, max_scheduled: usize) -> Self {
        Self::with_clock(min_interval, max_scheduled, Arc::new(TokioClock))
    }

    pub fn with_clock(min_interval: Duration, max_scheduled: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            min_interval,
            last_scheduled: Mutex::new(None),
            slots: Arc::new(Semaphore::new(max_scheduled)),
            max_scheduled,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn capacity(&self) -> usize {
        self.max_scheduled
    }

    /// Actions admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.max_scheduled - self.slots.available_permits()
    }

    /// Claim the next execution instant: `max(now, last + min_interval)`.
    ///
    /// Reading and updating the last instant happen under one lock.
    pub fn reserve(&self) -> Admission {
        let now = self.clock.now();
        let mut last = self.last_scheduled.lock().unwrap_or_else(|e| e.into_inner());
        let at = match *last {
            None => now,
            Some(prev) => std::cmp::max(now, prev + self.min_interval),
        };
        *last = Some(at);
        Admission {
            at,
            delay: at.saturating_duration_since(now),
        }
    }

    /// Run `action` on the runtime no earlier than its reserved instant.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// `CapacityExceeded` when every slot is taken; a rejected admission does
    /// not consume an instant.
    pub fn admit<F>(&self, action: F) -> Result<Admission>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::CapacityExceeded {
                max: self.max_scheduled,
            })?;

        let admission = self.reserve();
        mlog_trace!("Scheduling action with delay: {} ms.", admission.delay.as_millis());

        let delay = admission.delay;
        tokio::spawn(async move {
            let _permit = permit;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            action.await;
        });

        Ok(admission)
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer")
            .field("min_interval", &self.min_interval)
            .field("max_scheduled", &self.max_scheduled)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
