// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Time sources for the acquisition loop

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Waits at least this long are split into a coarse sleep plus a spin
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Portion of a long wait that is always spun rather than slept
pub const SPIN_MARGIN: Duration = Duration::from_micros(500);

/// Monotonic time plus the ability to wait on it.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock origin. Never goes backwards.
    fn elapsed(&self) -> Duration;

    /// Wall-clock instant corresponding to `elapsed()`
    fn wall_time(&self) -> DateTime<Utc>;

    /// Coarse, OS-level sleep
    fn sleep(&self, duration: Duration);

    /// Wait with sub-millisecond accuracy.
    ///
    /// Waits of 1 ms or more sleep until 0.5 ms before the target and spin the
    /// rest; shorter waits only spin. Spinning pins a core for the duration.
    fn precise_wait(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let target = self.elapsed() + duration;
        if duration >= SPIN_THRESHOLD {
            self.sleep(duration - SPIN_MARGIN);
        }
        while self.elapsed() < target {
            std::hint::spin_loop();
        }
    }
}

/// Clock backed by `Instant`, anchored to the wall clock at construction
pub struct MonotonicClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        offset_wall(self.wall_origin, self.elapsed())
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for replay and tests.
///
/// Time only moves when somebody sleeps or waits on it, or calls `advance`.
/// Every sleep and wait overshoots by `wake_latency`, which models a loaded
/// system that wakes late.
pub struct ManualClock {
    now: Mutex<Duration>,
    wake_latency: Duration,
    wall_origin: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self::with_latency(wall_origin, Duration::ZERO)
    }

    pub fn with_latency(wall_origin: DateTime<Utc>, wake_latency: Duration) -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
            wake_latency,
            wall_origin,
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        offset_wall(self.wall_origin, self.elapsed())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration + self.wake_latency);
    }

    fn precise_wait(&self, duration: Duration) {
        if !duration.is_zero() {
            self.advance(duration + self.wake_latency);
        }
    }
}

fn offset_wall(origin: DateTime<Utc>, elapsed: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(elapsed) {
        Ok(offset) => origin + offset,
        Err(_) => origin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_precise_wait_reaches_target() {
        let clock = MonotonicClock::new();
        let start = clock.elapsed();
        clock.precise_wait(Duration::from_millis(3));
        assert!(clock.elapsed() - start >= Duration::from_millis(3));

        let start = clock.elapsed();
        clock.precise_wait(Duration::from_micros(200));
        assert!(clock.elapsed() - start >= Duration::from_micros(200));
    }

    #[test]
    fn test_wall_time_tracks_elapsed() {
        let origin = Utc::now();
        let clock = ManualClock::new(origin);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.wall_time() - origin, chrono::Duration::milliseconds(1500));
    }

    #[test]
    fn test_manual_clock_wakes_late() {
        let clock = ManualClock::with_latency(Utc::now(), Duration::from_millis(2));
        clock.precise_wait(Duration::from_millis(10));
        assert_eq!(clock.elapsed(), Duration::from_millis(12));
        clock.precise_wait(Duration::ZERO);
        assert_eq!(clock.elapsed(), Duration::from_millis(12));
    }
}
