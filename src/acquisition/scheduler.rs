// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Dual-rate acquisition scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::performance::{PerformanceConfig, StreamPerformance};
use super::{Clock, Sample, SampleBuffer};
use crate::metrics::{AcquisitionMetrics, MetricsSender};
use crate::sensors::{calibrate_all, AccelCalibration, SensorError, SensorSource};

/// Consecutive fatal sensor errors that stop the loop
pub const MAX_CONSECUTIVE_FATAL: u32 = 3;

/// Below this the idle wait goes straight to the target
const IDLE_SLEEP_MIN: Duration = Duration::from_micros(100);

/// Upper bound on one idle wait so the running flag is seen promptly
const MAX_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Log every n-th transient error after the first few
const TRANSIENT_LOG_EVERY: u64 = 100;

/// Errors that stop acquisition
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("source has neither accelerometers nor displacement channels")]
    NoStreams,

    #[error("invalid sampling rate: {0} Hz")]
    InvalidRate(f64),

    #[error("acquisition stopped after {count} consecutive fatal sensor errors (last: {last})")]
    TooManyFatalErrors { count: u32, last: SensorError },
}

/// Scheduler parameters
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub accel_rate_hz: f64,
    pub displacement_rate_hz: f64,
    pub buffer_capacity: usize,
    pub accel_calibration: Vec<AccelCalibration>,
    pub performance: PerformanceConfig,
}

impl SchedulerSettings {
    pub fn new(accel_rate_hz: f64, displacement_rate_hz: f64, buffer_capacity: usize) -> Self {
        Self {
            accel_rate_hz,
            displacement_rate_hz,
            buffer_capacity,
            accel_calibration: Vec::new(),
            performance: PerformanceConfig::default(),
        }
    }
}

/// Fixed-rate schedule for one stream.
///
/// The next target is always `origin + sample_count / rate`, recomputed from
/// the count, so late wake-ups never accumulate into drift.
#[derive(Debug, Clone)]
pub struct StreamClock {
    origin: Duration,
    rate_hz: f64,
    sample_count: u64,
    next_target: Duration,
}

impl StreamClock {
    pub fn new(origin: Duration, rate_hz: f64) -> Self {
        Self {
            origin,
            rate_hz,
            sample_count: 0,
            next_target: origin,
        }
    }

    /// Saturates at `Duration::MAX`, a target that is never due
    pub fn target_for(&self, count: u64) -> Duration {
        Duration::try_from_secs_f64(count as f64 / self.rate_hz)
            .map_or(Duration::MAX, |offset| self.origin.saturating_add(offset))
    }

    pub fn is_due(&self, now: Duration) -> bool {
        now >= self.next_target
    }

    pub fn next_target(&self) -> Duration {
        self.next_target
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn advance(&mut self) {
        self.sample_count += 1;
        self.next_target = self.target_for(self.sample_count);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Accel,
    Displacement,
}

impl Stream {
    fn label(self) -> &'static str {
        match self {
            Stream::Accel => "accelerometer",
            Stream::Displacement => "lvdt",
        }
    }
}

/// Totals reported when the loop exits cleanly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub accel_samples: u64,
    pub displacement_samples: u64,
    pub samples_pushed: u64,
    pub samples_dropped: u64,
    pub transient_errors: u64,
}

/// Drives both sensor streams from one loop and feeds the sample buffer
pub struct Scheduler {
    source: Box<dyn SensorSource>,
    clock: Arc<dyn Clock>,
    buffer: Arc<SampleBuffer>,
    metrics: Option<MetricsSender<AcquisitionMetrics>>,
    settings: SchedulerSettings,

    accel: Option<StreamClock>,
    displacement: Option<StreamClock>,
    accel_perf: StreamPerformance,
    disp_perf: StreamPerformance,
    started: bool,

    stats_interval: Duration,
    last_stats: Duration,
    /// Consecutive fatal errors per stream, reset by that stream's next good read
    accel_fatal: u32,
    disp_fatal: u32,
    transient_errors: u64,
    failed: bool,
}

impl Scheduler {
    pub fn configure(
        settings: SchedulerSettings,
        source: Box<dyn SensorSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AcquisitionError> {
        let has_accel = source.has_accelerometers();
        let has_disp = source.has_displacement();
        if !has_accel && !has_disp {
            return Err(AcquisitionError::NoStreams);
        }
        for (enabled, rate) in [
            (has_accel, settings.accel_rate_hz),
            (has_disp, settings.displacement_rate_hz),
        ] {
            if enabled && !(rate.is_finite() && rate > 0.0) {
                return Err(AcquisitionError::InvalidRate(rate));
            }
        }

        let perf = &settings.performance;
        let accel_perf = StreamPerformance::new(perf.window, perf.max_accel_jitter_ms);
        let disp_perf = StreamPerformance::new(perf.window, perf.max_displacement_jitter_ms);
        let stats_interval = Duration::try_from_secs_f64(perf.stats_interval_secs.max(0.0)).unwrap_or(Duration::MAX);

        let accel = has_accel.then(|| StreamClock::new(Duration::ZERO, settings.accel_rate_hz));
        let displacement = has_disp.then(|| StreamClock::new(Duration::ZERO, settings.displacement_rate_hz));

        Ok(Self {
            buffer: Arc::new(SampleBuffer::new(settings.buffer_capacity)),
            source,
            clock,
            metrics: None,
            settings,
            accel,
            displacement,
            accel_perf,
            disp_perf,
            started: false,
            stats_interval,
            last_stats: Duration::ZERO,
            accel_fatal: 0,
            disp_fatal: 0,
            transient_errors: 0,
            failed: false,
        })
    }

    /// Publish acquisition metrics on this channel
    pub fn with_metrics(mut self, sender: MetricsSender<AcquisitionMetrics>) -> Self {
        self.metrics = Some(sender);
        self
    }

    /// Consumer side of the sample queue
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn accel_sample_count(&self) -> u64 {
        self.accel.as_ref().map(StreamClock::sample_count).unwrap_or(0)
    }

    pub fn displacement_sample_count(&self) -> u64 {
        self.displacement.as_ref().map(StreamClock::sample_count).unwrap_or(0)
    }

    /// Run until `running` is cleared or the source fails fatally.
    ///
    /// The flag is checked between ticks; a tick in progress always finishes
    /// and pushes what it acquired.
    pub fn run(&mut self, running: &AtomicBool) -> Result<AcquisitionSummary, AcquisitionError> {
        info!(
            "Acquisition started: {} (accel {} Hz, lvdt {} Hz)",
            self.source.name(),
            self.rate_label(self.accel.is_some(), self.settings.accel_rate_hz),
            self.rate_label(self.displacement.is_some(), self.settings.displacement_rate_hz),
        );

        let result = loop {
            if !running.load(Ordering::Acquire) {
                break Ok(());
            }
            if let Err(e) = self.tick() {
                break Err(e);
            }
        };

        self.refresh_stats();
        match result {
            Ok(()) => {
                let summary = self.summary();
                info!(
                    "Acquisition stopped: {} accel / {} lvdt samples, {} dropped",
                    summary.accel_samples, summary.displacement_samples, summary.samples_dropped
                );
                Ok(summary)
            }
            Err(e) => {
                error!("FATAL acquisition error: {}", e);
                Err(e)
            }
        }
    }

    /// One loop iteration: read every due stream, push the composite sample,
    /// then idle towards the next target. The idle wait is what lands each
    /// read on its target; a stream found due here is read immediately.
    pub fn tick(&mut self) -> Result<bool, AcquisitionError> {
        self.ensure_started();
        let now = self.clock.elapsed();
        let mut timestamp = None;

        let accel_read = match self.accel.as_mut() {
            Some(stream) if stream.is_due(now) => {
                stream.advance();
                self.accel_perf.record(self.clock.elapsed());
                timestamp.get_or_insert_with(|| self.clock.wall_time());
                Some(self.source.read_acceleration())
            }
            _ => None,
        };

        let disp_read = match self.displacement.as_mut() {
            Some(stream) if stream.is_due(now) => {
                stream.advance();
                self.disp_perf.record(self.clock.elapsed());
                timestamp.get_or_insert_with(|| self.clock.wall_time());
                Some(self.source.read_displacement())
            }
            _ => None,
        };

        let mut fatal = None;
        let mut acceleration = Vec::new();
        let mut displacement = Vec::new();

        match accel_read {
            Some(Ok(raw)) => {
                acceleration = calibrate_all(&self.settings.accel_calibration, raw);
                self.accel_fatal = 0;
            }
            Some(Err(e)) => fatal = self.note_sensor_error(Stream::Accel, e),
            None => {}
        }
        match disp_read {
            Some(Ok(readings)) => {
                displacement = readings;
                self.disp_fatal = 0;
            }
            Some(Err(e)) => {
                let failed = self.note_sensor_error(Stream::Displacement, e);
                fatal = fatal.or(failed);
            }
            None => {}
        }

        let sample = Sample::new(timestamp.unwrap_or_else(|| self.clock.wall_time()), acceleration, displacement);
        let pushed = !sample.is_empty();
        if pushed {
            self.buffer.push(sample);
        }

        if let Some((count, last)) = fatal {
            self.failed = true;
            self.refresh_stats();
            return Err(AcquisitionError::TooManyFatalErrors { count, last });
        }

        if self.clock.elapsed().saturating_sub(self.last_stats) >= self.stats_interval {
            self.refresh_stats();
        }

        self.idle();
        Ok(pushed)
    }

    pub fn summary(&self) -> AcquisitionSummary {
        AcquisitionSummary {
            accel_samples: self.accel_sample_count(),
            displacement_samples: self.displacement_sample_count(),
            samples_pushed: self.buffer.pushed(),
            samples_dropped: self.buffer.dropped(),
            transient_errors: self.transient_errors,
        }
    }

    pub fn metrics(&self) -> AcquisitionMetrics {
        AcquisitionMetrics {
            acceleration: self.accel_perf.snapshot(self.accel.is_some()),
            displacement: self.disp_perf.snapshot(self.displacement.is_some()),
            samples_pushed: self.buffer.pushed(),
            samples_dropped: self.buffer.dropped(),
            buffered: self.buffer.len(),
            transient_errors: self.transient_errors,
            failed: self.failed,
        }
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        let origin = self.clock.elapsed();
        if let Some(stream) = self.accel.as_mut() {
            *stream = StreamClock::new(origin, self.settings.accel_rate_hz);
        }
        if let Some(stream) = self.displacement.as_mut() {
            *stream = StreamClock::new(origin, self.settings.displacement_rate_hz);
        }
        self.accel_perf.start(origin);
        self.disp_perf.start(origin);
        self.last_stats = origin;
        self.started = true;
    }

    /// Returns the stream's count and error once its fatal limit is reached
    fn note_sensor_error(&mut self, stream: Stream, err: SensorError) -> Option<(u32, SensorError)> {
        if err.is_fatal() {
            let count = match stream {
                Stream::Accel => &mut self.accel_fatal,
                Stream::Displacement => &mut self.disp_fatal,
            };
            *count += 1;
            let count = *count;
            warn!(
                "Fatal {} error ({}/{}): {}",
                stream.label(),
                count,
                MAX_CONSECUTIVE_FATAL,
                err
            );
            if count >= MAX_CONSECUTIVE_FATAL {
                return Some((count, err));
            }
        } else {
            let stream = stream.label();
            self.transient_errors += 1;
            if self.transient_errors <= 3 || self.transient_errors % TRANSIENT_LOG_EVERY == 0 {
                warn!("{} read failed ({} total): {}", stream, self.transient_errors, err);
            } else {
                debug!("{} read failed: {}", stream, err);
            }
        }
        None
    }

    fn refresh_stats(&mut self) {
        self.accel_perf.update();
        self.disp_perf.update();
        if self.accel.is_some() && self.accel_perf.jitter_exceeded() {
            warn!(
                "Accelerometer jitter {:.2} ms exceeds {:.2} ms",
                self.accel_perf.jitter_ms(),
                self.settings.performance.max_accel_jitter_ms
            );
        }
        if self.displacement.is_some() && self.disp_perf.jitter_exceeded() {
            warn!(
                "LVDT jitter {:.2} ms exceeds {:.2} ms",
                self.disp_perf.jitter_ms(),
                self.settings.performance.max_displacement_jitter_ms
            );
        }
        self.last_stats = self.clock.elapsed();
        if let Some(tx) = &self.metrics {
            tx.send_replace(self.metrics());
        }
    }

    fn idle(&self) {
        let next = [self.accel.as_ref(), self.displacement.as_ref()]
            .into_iter()
            .flatten()
            .map(StreamClock::next_target)
            .min();
        let Some(next) = next else { return };

        let remaining = next.saturating_sub(self.clock.elapsed());
        if remaining > IDLE_SLEEP_MIN {
            self.clock.precise_wait(remaining.mul_f64(0.9).min(MAX_IDLE_WAIT));
        } else {
            self.clock.precise_wait(remaining);
        }
    }

    fn rate_label(&self, enabled: bool, rate: f64) -> String {
        if enabled {
            format!("{}", rate)
        } else {
            "off".to_string()
        }
    }
}
