// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Achieved sampling rate and jitter

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::time::Duration;

use crate::metrics::StreamMetrics;

/// Number of inter-sample periods kept per stream
pub const DEFAULT_PERIOD_WINDOW: usize = 99;

/// Rate and jitter limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Inter-sample periods kept per stream
    pub window: usize,

    /// Accelerometer jitter above this is reported, in ms
    pub max_accel_jitter_ms: f64,

    /// Displacement jitter above this is reported, in ms
    pub max_displacement_jitter_ms: f64,

    /// Seconds between metric recomputations
    pub stats_interval_secs: f64,

    /// Seconds between status log lines
    pub status_interval_secs: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_PERIOD_WINDOW,
            max_accel_jitter_ms: 1.5,
            max_displacement_jitter_ms: 5.0,
            stats_interval_secs: 1.0,
            status_interval_secs: 2.0,
        }
    }
}

/// Rate in Hz and jitter in ms for a set of periods in seconds.
///
/// Returns zeros for fewer than two periods or a non-positive mean.
pub fn rate_and_jitter<'a, I>(periods: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let periods = periods.into_iter();
    if periods.clone().count() < 2 {
        return (0.0, 0.0);
    }
    let mean = periods.clone().mean();
    if !(mean > 0.0) {
        return (0.0, 0.0);
    }
    let jitter_ms = periods.population_std_dev() * 1000.0;
    (1.0 / mean, jitter_ms)
}

/// Rolling timing statistics for one sensor stream
#[derive(Debug, Clone)]
pub struct StreamPerformance {
    periods: VecDeque<f64>,
    window: usize,
    last: Option<Duration>,
    samples: u64,
    rate_hz: f64,
    jitter_ms: f64,
    max_jitter_ms: f64,
}

impl StreamPerformance {
    pub fn new(window: usize, max_jitter_ms: f64) -> Self {
        let window = window.max(2);
        Self {
            periods: VecDeque::with_capacity(window),
            window,
            last: None,
            samples: 0,
            rate_hz: 0.0,
            jitter_ms: 0.0,
            max_jitter_ms,
        }
    }

    /// Set the reference point the first period is measured from
    pub fn start(&mut self, now: Duration) {
        self.last = Some(now);
    }

    /// Note that a sample was taken at `now`
    pub fn record(&mut self, now: Duration) {
        self.samples += 1;
        if let Some(last) = self.last {
            let period = now.saturating_sub(last).as_secs_f64();
            if period > 0.0 {
                if self.periods.len() == self.window {
                    self.periods.pop_front();
                }
                self.periods.push_back(period);
            }
        }
        self.last = Some(now);
    }

    /// Recompute rate and jitter from the current window
    pub fn update(&mut self) {
        if self.periods.len() > 1 {
            let (rate, jitter) = rate_and_jitter(&self.periods);
            self.rate_hz = rate;
            self.jitter_ms = jitter;
        }
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    pub fn jitter_ms(&self) -> f64 {
        self.jitter_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn jitter_exceeded(&self) -> bool {
        self.jitter_ms > self.max_jitter_ms
    }

    pub fn snapshot(&self, enabled: bool) -> StreamMetrics {
        StreamMetrics {
            enabled,
            samples: self.samples,
            rate_hz: self.rate_hz,
            jitter_ms: self.jitter_ms,
            jitter_exceeded: self.jitter_exceeded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_periods_have_no_jitter() {
        let periods = vec![0.005; 50];
        let (rate, jitter) = rate_and_jitter(&periods);
        assert!((rate - 200.0).abs() < 1e-6);
        assert!(jitter.abs() < 1e-9);
    }

    #[test]
    fn test_jitter_is_population_std_dev_in_ms() {
        let periods = vec![0.009, 0.011, 0.009, 0.011];
        let (rate, jitter) = rate_and_jitter(&periods);
        assert!((rate - 100.0).abs() < 1e-6);
        assert!((jitter - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_windows_report_zero() {
        assert_eq!(rate_and_jitter(&[0.01]), (0.0, 0.0));
        assert_eq!(rate_and_jitter(&[0.0, 0.0, 0.0]), (0.0, 0.0));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut perf = StreamPerformance::new(10, 1.5);
        perf.start(Duration::ZERO);
        for i in 1..=100u64 {
            perf.record(Duration::from_millis(i * 10));
        }
        perf.update();
        assert_eq!(perf.periods.len(), 10);
        assert_eq!(perf.samples(), 100);
        assert!((perf.rate_hz() - 100.0).abs() < 1e-6);
        assert!(!perf.jitter_exceeded());
    }

    #[test]
    fn test_jitter_limit_flags_unstable_stream() {
        let mut perf = StreamPerformance::new(99, 1.5);
        perf.start(Duration::ZERO);
        let mut t = Duration::ZERO;
        for i in 0..20 {
            t += if i % 2 == 0 { Duration::from_millis(2) } else { Duration::from_millis(8) };
            perf.record(t);
        }
        perf.update();
        assert!(perf.jitter_ms() > 1.5);
        assert!(perf.jitter_exceeded());
    }
}
