//! Fixed-cadence re-issue timer for EchoMark broadcasts.
//!
//! A broadcasting session mints a fresh token every few seconds so that a
//! recording of one token goes stale long before it can be replayed. This
//! crate provides the timer that paces those re-issues, with overrun
//! detection so a stalled runtime never produces a burst of back-to-back
//! tokens.
//!
//! # Integration
//!
//! The scheduler sits inside a broadcast task's `tokio::select!` loop next
//! to the cancel signal:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut cancel => break,
//!         _ = timer.wait_for_tick() => {
//!             let token = session.issue_next_token(now)?;
//!             frames.try_send(codec.encode(&token));
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one a full interval
    /// from now. Tokens stay evenly spaced after a stall.
    #[default]
    Skip,
    /// Keep the original cadence. The next tick fires at its originally
    /// scheduled time, which may be immediately.
    Drop,
}

/// Full configuration for the re-issue timer.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Random delay (0..max) added to the *first* tick so sessions started
    /// at the same instant do not transmit in lockstep.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            policy: TickPolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }
}

impl TickConfig {
    /// Shortest interval the timer will run at.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Config for a specific interval with default settings.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to run.
    ///
    /// Called automatically by [`TickScheduler::new`]. An interval below
    /// [`Self::MIN_INTERVAL`] is raised to it, and jitter is capped at one
    /// interval.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "re-issue interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.initial_jitter > self.interval {
            self.initial_jitter = self.interval;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired more than 10% of an interval late.
    pub overrun: bool,
    /// Whole intervals missed because of the overrun (0 normally).
    pub ticks_skipped: u64,
}

/// Running counters for the timer.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    /// Ticks fired.
    pub total_ticks: u64,
    /// Ticks that fired late.
    pub total_overruns: u64,
    /// Intervals skipped over because of overruns.
    pub total_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-cadence timer. One per broadcasting session.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire (Tokio instant for `sleep_until`).
    next_tick: Instant,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a timer whose first tick fires one interval (plus jitter)
    /// from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = u64::try_from(config.initial_jitter.as_micros()).unwrap_or(u64::MAX);
            Duration::from_micros(rand::rng().random_range(0..max))
        };

        debug!(
            interval_ms = config.interval.as_millis() as u64,
            jitter_us = jitter.as_micros() as u64,
            policy = ?config.policy,
            "re-issue timer created"
        );

        Self {
            next_tick: Instant::now() + config.interval + jitter,
            config,
            tick_count: 0,
            metrics: TickMetrics::default(),
        }
    }

    /// Creates a timer for a specific interval with default settings.
    pub fn with_interval(interval: Duration) -> Self {
        Self::new(TickConfig::with_interval(interval))
    }

    /// Waits until the next tick is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// schedule unchanged, so it can sit in a `select!` loop.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let next = self.next_tick;
        let interval = self.config.interval;

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > interval / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / interval.as_nanos()) as u64
        } else {
            0
        };

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                if ticks_skipped > 0 {
                    warn!(
                        tick = self.tick_count,
                        skipped = ticks_skipped,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "re-issue overrun, skipping ahead"
                    );
                }
                now + interval
            }
            TickPolicy::Drop => {
                if overrun {
                    warn!(
                        tick = self.tick_count,
                        late_ms = late_by.as_secs_f64() * 1000.0,
                        "re-issue overrun, keeping original cadence"
                    );
                }
                next + interval
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The (validated) interval between ticks.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Snapshot of the running counters.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
