//! Integration tests for the re-issue timer.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the runtime
//! is idle and late ticks can be forced with `tokio::time::advance`.

use std::time::Duration;

use echomark_tick::{TickConfig, TickPolicy, TickScheduler};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn config_1s(policy: TickPolicy) -> TickConfig {
    TickConfig {
        interval: Duration::from_secs(1),
        policy,
        initial_jitter: Duration::ZERO,
    }
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_reissues_every_three_seconds() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.interval, Duration::from_secs(3));
    assert_eq!(cfg.policy, TickPolicy::Skip);
    assert_eq!(cfg.initial_jitter, Duration::ZERO);
}

#[test]
fn test_validated_clamps_short_interval() {
    let cfg = TickConfig::with_interval(Duration::from_millis(5)).validated();
    assert_eq!(cfg.interval, TickConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_caps_jitter_at_one_interval() {
    let cfg = TickConfig {
        initial_jitter: Duration::from_secs(10),
        ..TickConfig::with_interval(Duration::from_secs(2))
    }
    .validated();
    assert_eq!(cfg.initial_jitter, Duration::from_secs(2));
}

// =========================================================================
// Scheduler creation and accessors
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_1s(TickPolicy::Skip));
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.interval(), Duration::from_secs(1));
    assert_eq!(s.metrics().total_ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_with_interval_uses_validated_interval() {
    let s = TickScheduler::with_interval(Duration::from_millis(1));
    assert_eq!(s.interval(), TickConfig::MIN_INTERVAL);
}

// =========================================================================
// Cadence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_one_interval_after_creation() {
    let start = Instant::now();
    let mut s = TickScheduler::new(config_1s(TickPolicy::Skip));

    let info = s.wait_for_tick().await;

    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_evenly_spaced() {
    let start = Instant::now();
    let mut s = TickScheduler::new(config_1s(TickPolicy::Skip));

    for expected in 1..=5u64 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert!(!info.overrun);
        assert_eq!(start.elapsed(), Duration::from_secs(expected));
    }
    assert_eq!(s.tick_count(), 5);
    assert_eq!(s.metrics().total_ticks, 5);
    assert_eq!(s.metrics().total_overruns, 0);
}

#[tokio::test(start_paused = true)]
async fn test_jittered_first_tick_lands_within_two_intervals() {
    let start = Instant::now();
    let mut s = TickScheduler::new(TickConfig {
        initial_jitter: Duration::from_millis(500),
        ..config_1s(TickPolicy::Skip)
    });

    s.wait_for_tick().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1_500));
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reschedules_from_now_after_stall() {
    let start = Instant::now();
    let mut s = TickScheduler::new(config_1s(TickPolicy::Skip));

    // Stall the runtime for 3.5 s: the first tick is 2.5 s late.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 2);

    // Next tick is a full interval after the late one, not a burst.
    let info = s.wait_for_tick().await;
    assert!(!info.overrun);
    assert_eq!(info.tick, 2);
    assert_eq!(start.elapsed(), Duration::from_millis(4_500));

    assert_eq!(s.metrics().total_overruns, 1);
    assert_eq!(s.metrics().total_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_cadence() {
    let start = Instant::now();
    let mut s = TickScheduler::new(config_1s(TickPolicy::Drop));

    tokio::time::advance(Duration::from_millis(2_500)).await;

    // Due at 1 s, fired at 2.5 s.
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 1);

    // Due at 2 s, fires immediately.
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(start.elapsed(), Duration::from_millis(2_500));

    // Due at 3 s, back on schedule.
    let info = s.wait_for_tick().await;
    assert!(!info.overrun);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_small_lateness_is_not_an_overrun() {
    let mut s = TickScheduler::new(config_1s(TickPolicy::Skip));

    // 50 ms late is within the 10% tolerance.
    tokio::time::advance(Duration::from_millis(1_050)).await;
    let info = s.wait_for_tick().await;
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
}

// =========================================================================
// Integration: select! loop pattern (mirrors broadcast task usage)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_stops_on_cancel() {
    let mut s = TickScheduler::new(config_1s(TickPolicy::Skip));
    let (cancel_tx, mut cancel_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_200)).await;
        cancel_tx.send(()).ok();
    });

    let mut ticks_fired = 0u64;
    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            info = s.wait_for_tick() => {
                ticks_fired += 1;
                assert_eq!(info.tick, ticks_fired);
            }
        }
    }

    assert_eq!(ticks_fired, 3);
}
