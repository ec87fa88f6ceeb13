// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Trigger/detrigger state machine with pre-trigger capture

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{Event, MovingAverage, ThresholdSet};
use crate::acquisition::Sample;
use crate::metrics::{DetectionMetrics, MetricsSender};
use crate::sensors::AccelReading;
use crate::storage::{EventHandle, EventSink};

/// Default pre-trigger ring capacity in samples
pub const DEFAULT_PRE_TRIGGER_CAPACITY: usize = 1000;

/// Default displacement smoothing window in samples
pub const DEFAULT_DISPLACEMENT_WINDOW: usize = 10;

/// Consecutive processing errors between warnings
pub const DEFAULT_MAX_ERRORS: u32 = 100;

/// Seconds of accelerometer samples in the smoothing window
const ACCEL_AVERAGE_SECONDS: f64 = 0.5;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("sample carries no readings")]
    EmptySample,

    #[error("non-finite {0} reading")]
    NonFinite(&'static str),

    #[error("invalid detector settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub thresholds: ThresholdSet,
    pub pre_trigger_capacity: usize,

    /// Nominal accelerometer rate, sets the event sample period
    pub accel_rate_hz: f64,
    pub displacement_window: usize,
    pub max_errors: u32,

    /// When set, acceleration magnitude is `| |a| - g |` rather than `|a|`
    pub gravity_compensation: Option<f64>,
}

impl DetectorSettings {
    pub fn new(thresholds: ThresholdSet, pre_trigger_capacity: usize, accel_rate_hz: f64) -> Self {
        Self {
            thresholds,
            pre_trigger_capacity,
            accel_rate_hz,
            displacement_window: DEFAULT_DISPLACEMENT_WINDOW,
            max_errors: DEFAULT_MAX_ERRORS,
            gravity_compensation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Recording,
}

/// What one processed sample did to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Idle,
    Started,
    Recording,
    Persisted(EventHandle),
    /// Completed below the minimum duration and dropped without a persist call
    Discarded { samples: usize },
    PersistFailed,
}

pub struct EventDetector {
    settings: DetectorSettings,
    sink: Box<dyn EventSink>,
    metrics: Option<MetricsSender<DetectionMetrics>>,
    sample_period: f64,

    state: DetectorState,
    pre_trigger: VecDeque<Sample>,
    current_event: Vec<Sample>,
    last_trigger: Option<DateTime<Utc>>,
    last_acceleration: Option<AccelReading>,
    last_displacement: Option<f64>,
    accel_avg: MovingAverage,
    disp_avg: MovingAverage,

    event_count: u64,
    samples_processed: u64,
    processing_errors: u64,
    consecutive_errors: u32,
    discarded_events: u64,
    failed_persists: u64,
}

impl EventDetector {
    pub fn configure(settings: DetectorSettings, sink: Box<dyn EventSink>) -> Result<Self, DetectionError> {
        settings.thresholds.validate()?;
        if settings.pre_trigger_capacity == 0 {
            return Err(DetectionError::InvalidSettings("pre_trigger_capacity must be at least 1".into()));
        }
        if !(settings.accel_rate_hz.is_finite() && settings.accel_rate_hz > 0.0) {
            return Err(DetectionError::InvalidSettings(format!(
                "accel_rate_hz must be > 0, got {}",
                settings.accel_rate_hz
            )));
        }

        Ok(Self {
            sample_period: 1.0 / settings.accel_rate_hz,
            pre_trigger: VecDeque::with_capacity(settings.pre_trigger_capacity),
            current_event: Vec::new(),
            accel_avg: MovingAverage::for_duration(ACCEL_AVERAGE_SECONDS, settings.accel_rate_hz),
            disp_avg: MovingAverage::new(settings.displacement_window),
            settings,
            sink,
            metrics: None,
            state: DetectorState::Idle,
            last_trigger: None,
            last_acceleration: None,
            last_displacement: None,
            event_count: 0,
            samples_processed: 0,
            processing_errors: 0,
            consecutive_errors: 0,
            discarded_events: 0,
            failed_persists: 0,
        })
    }

    pub fn with_metrics(mut self, sender: MetricsSender<DetectionMetrics>) -> Self {
        self.metrics = Some(sender);
        self
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == DetectorState::Recording
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Feed the next sample from the buffer.
    ///
    /// An invalid sample is counted and rejected without touching the state
    /// machine.
    pub fn process(&mut self, sample: Sample) -> Result<ProcessOutcome, DetectionError> {
        if let Err(e) = Self::check(&sample) {
            self.note_error(&e);
            return Err(e);
        }
        self.consecutive_errors = 0;
        self.samples_processed += 1;

        if let Some(a) = sample.first_acceleration() {
            self.last_acceleration = Some(*a);
        }
        if let Some(d) = sample.first_displacement() {
            self.last_displacement = Some(d);
        }

        let accel = sample.first_acceleration().map(|a| self.magnitude(a));
        let disp = sample.first_displacement().map(f64::abs);
        if let Some(a) = accel {
            self.accel_avg.push(a);
        }
        if let Some(d) = disp {
            self.disp_avg.push(d);
        }

        let thresholds = &self.settings.thresholds;
        let triggered = accel.map_or(false, |a| a > thresholds.trigger_acceleration)
            || disp.map_or(false, |d| d > thresholds.trigger_displacement);
        let now = sample.timestamp;

        let outcome = match (self.state, triggered) {
            (DetectorState::Idle, true) => {
                self.current_event = self.pre_trigger.iter().cloned().collect();
                self.current_event.push(sample.clone());
                self.last_trigger = Some(now);
                self.state = DetectorState::Recording;
                info!(
                    "New event detected at {} (accel {:.3}, disp {:.3})",
                    now.format("%H:%M:%S%.3f"),
                    accel.unwrap_or(0.0),
                    disp.unwrap_or(0.0)
                );
                ProcessOutcome::Started
            }
            (DetectorState::Idle, false) => ProcessOutcome::Idle,
            (DetectorState::Recording, true) => {
                self.current_event.push(sample.clone());
                self.last_trigger = Some(now);
                ProcessOutcome::Recording
            }
            (DetectorState::Recording, false) => {
                self.current_event.push(sample.clone());
                let quiet = self.last_trigger.map_or(f64::INFINITY, |t| seconds_between(t, now));
                if quiet > self.settings.thresholds.post_event_seconds {
                    self.complete(true)
                } else {
                    ProcessOutcome::Recording
                }
            }
        };

        // after a completed event the ring starts empty again
        if !matches!(
            outcome,
            ProcessOutcome::Persisted(_) | ProcessOutcome::Discarded { .. } | ProcessOutcome::PersistFailed
        ) {
            if self.pre_trigger.len() == self.settings.pre_trigger_capacity {
                self.pre_trigger.pop_front();
            }
            self.pre_trigger.push_back(sample);
        }

        self.publish();
        Ok(outcome)
    }

    /// Persist an in-progress event on shutdown, ignoring the minimum
    /// duration. Returns `None` when idle, so a second call is a no-op.
    pub fn finalize(&mut self) -> Option<ProcessOutcome> {
        if self.state != DetectorState::Recording {
            return None;
        }
        info!("Finalizing in-progress event ({} samples)", self.current_event.len());
        let outcome = self.complete(false);
        self.publish();
        Some(outcome)
    }

    pub fn metrics(&self) -> DetectionMetrics {
        DetectionMetrics {
            event_count: self.event_count,
            is_recording: self.is_recording(),
            samples_processed: self.samples_processed,
            processing_errors: self.processing_errors,
            discarded_events: self.discarded_events,
            failed_persists: self.failed_persists,
            current_event_samples: self.current_event.len(),
            accel_moving_avg: self.accel_avg.value(),
            disp_moving_avg: self.disp_avg.value(),
            last_trigger: self.last_trigger,
            last_acceleration: self.last_acceleration,
            last_displacement: self.last_displacement,
        }
    }

    fn check(sample: &Sample) -> Result<(), DetectionError> {
        if sample.is_empty() {
            return Err(DetectionError::EmptySample);
        }
        if sample.first_acceleration().map_or(false, |a| !a.is_finite()) {
            return Err(DetectionError::NonFinite("acceleration"));
        }
        if sample.first_displacement().map_or(false, |d| !d.is_finite()) {
            return Err(DetectionError::NonFinite("displacement"));
        }
        Ok(())
    }

    fn magnitude(&self, reading: &AccelReading) -> f64 {
        let norm = reading.magnitude();
        match self.settings.gravity_compensation {
            Some(g) => (norm - g).abs(),
            None => norm,
        }
    }

    fn note_error(&mut self, err: &DetectionError) {
        self.processing_errors += 1;
        self.consecutive_errors += 1;
        debug!("Rejected sample: {}", err);
        if self.consecutive_errors >= self.settings.max_errors {
            warn!(
                "{} consecutive processing errors (last: {}), {} total",
                self.consecutive_errors, err, self.processing_errors
            );
            self.consecutive_errors = 0;
        }
    }

    fn complete(&mut self, enforce_min_duration: bool) -> ProcessOutcome {
        let recorded = std::mem::take(&mut self.current_event);
        let duration = recorded.len() as f64 * self.sample_period;
        self.reset();

        if enforce_min_duration && duration < self.settings.thresholds.min_event_duration_seconds {
            debug!(
                "Discarding short event: {:.2}s < {:.2}s",
                duration, self.settings.thresholds.min_event_duration_seconds
            );
            self.discarded_events += 1;
            return ProcessOutcome::Discarded { samples: recorded.len() };
        }

        let Some(event) = Event::from_recording(recorded, self.sample_period) else {
            self.discarded_events += 1;
            return ProcessOutcome::Discarded { samples: 0 };
        };
        let (start, duration, len) = (event.start_time, event.duration_seconds, event.len());

        match self.sink.persist(event) {
            Ok(handle) => {
                self.event_count += 1;
                info!(
                    "Event {} complete: started {}, {:.2}s, {} samples -> {}",
                    self.event_count, start, duration, len, handle
                );
                ProcessOutcome::Persisted(handle)
            }
            Err(e) => {
                self.failed_persists += 1;
                error!("Failed to persist event started {}: {}", start, e);
                ProcessOutcome::PersistFailed
            }
        }
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.current_event.clear();
        self.pre_trigger.clear();
        self.last_trigger = None;
    }

    fn publish(&self) {
        if let Some(tx) = &self.metrics {
            tx.send_replace(self.metrics());
        }
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let elapsed = to - from;
    match elapsed.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => elapsed.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEventSink;
    use chrono::Duration;

    const IDLE: f64 = 9.81;
    const BURST: f64 = 12.0;

    /// 1.1 g on the raw norm, so gravity alone stays below it
    fn thresholds() -> ThresholdSet {
        ThresholdSet::from_triggers(10.79, 1.0)
    }

    fn detector(thresholds: ThresholdSet, capacity: usize, sink: &MemoryEventSink) -> EventDetector {
        EventDetector::configure(DetectorSettings::new(thresholds, capacity, 100.0), Box::new(sink.clone())).unwrap()
    }

    fn sample(t0: DateTime<Utc>, index: i64, magnitude: f64) -> Sample {
        Sample::new(
            t0 + Duration::milliseconds(index * 10),
            vec![AccelReading::new(0.0, 0.0, magnitude)],
            Vec::new(),
        )
    }

    /// Feed magnitudes from `start`, returning the index of every non-idle outcome
    fn feed(
        detector: &mut EventDetector,
        t0: DateTime<Utc>,
        start: i64,
        magnitudes: impl IntoIterator<Item = f64>,
    ) -> Vec<(i64, ProcessOutcome)> {
        let mut outcomes = Vec::new();
        for (offset, magnitude) in magnitudes.into_iter().enumerate() {
            let index = start + offset as i64;
            let outcome = detector.process(sample(t0, index, magnitude)).unwrap();
            if !matches!(outcome, ProcessOutcome::Idle | ProcessOutcome::Recording) {
                outcomes.push((index, outcome));
            }
        }
        outcomes
    }

    #[test]
    fn test_burst_produces_one_event() {
        let sink = MemoryEventSink::new();
        let mut det = detector(thresholds(), DEFAULT_PRE_TRIGGER_CAPACITY, &sink);
        let t0 = Utc::now();

        let stream = std::iter::repeat(IDLE)
            .take(50)
            .chain(std::iter::repeat(BURST).take(30))
            .chain(std::iter::repeat(IDLE).take(2000));
        let outcomes = feed(&mut det, t0, 0, stream);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], (50, ProcessOutcome::Started));
        // last trigger at 79, completes once more than 15 s have passed
        assert_eq!(outcomes[1].0, 79 + 1501);
        assert!(matches!(outcomes[1].1, ProcessOutcome::Persisted(_)));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(det.event_count(), 1);
        assert_eq!(det.state(), DetectorState::Idle);

        let event = &events[0];
        assert_eq!(event.start_time, t0);
        assert_eq!(event.len(), 1581);
        assert_eq!(event.samples.last().unwrap().timestamp, t0 + Duration::milliseconds(1580 * 10));
        let triggering = event.samples.iter().filter(|s| s.acceleration[0].z == BURST).count();
        assert_eq!(triggering, 30);
    }

    #[test]
    fn test_event_starts_one_ring_length_before_trigger() {
        let sink = MemoryEventSink::new();
        let mut t = thresholds();
        t.post_event_seconds = 0.1;
        t.min_event_duration_seconds = 0.0;
        let mut det = detector(t, 20, &sink);
        let t0 = Utc::now();

        let stream = std::iter::repeat(IDLE)
            .take(50)
            .chain(std::iter::repeat(BURST).take(5))
            .chain(std::iter::repeat(IDLE).take(50));
        feed(&mut det, t0, 0, stream);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, t0 + Duration::milliseconds(30 * 10));
    }

    #[test]
    fn test_short_trigger_is_discarded() {
        let sink = MemoryEventSink::new();
        let mut t = thresholds();
        t.post_event_seconds = 0.5;
        t.min_event_duration_seconds = 2.0;
        let mut det = detector(t, 10, &sink);
        let t0 = Utc::now();

        let stream = std::iter::repeat(IDLE)
            .take(50)
            .chain(std::iter::once(BURST))
            .chain(std::iter::repeat(IDLE).take(200));
        let outcomes = feed(&mut det, t0, 0, stream);

        assert!(sink.is_empty());
        assert_eq!(det.event_count(), 0);
        assert_eq!(outcomes[1], (50 + 51, ProcessOutcome::Discarded { samples: 10 + 1 + 51 }));
        assert_eq!(det.metrics().discarded_events, 1);
    }

    #[test]
    fn test_duplicate_timestamps_persist_once() {
        let sink = MemoryEventSink::new();
        let mut t = thresholds();
        t.post_event_seconds = 0.05;
        t.min_event_duration_seconds = 0.0;
        let mut det = detector(t, 10, &sink);
        let t0 = Utc::now();

        det.process(sample(t0, 0, BURST)).unwrap();
        det.process(sample(t0, 1, BURST)).unwrap();
        det.process(sample(t0, 1, BURST)).unwrap();
        feed(&mut det, t0, 2, std::iter::repeat(IDLE).take(10));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let mut stamps: Vec<_> = events[0].samples.iter().map(|s| s.timestamp).collect();
        let len = stamps.len();
        stamps.dedup();
        assert_eq!(stamps.len(), len);
        assert_eq!(events[0].samples[1].timestamp, t0 + Duration::milliseconds(10));
        assert_eq!(events[0].samples[2].timestamp, t0 + Duration::milliseconds(20));
    }

    #[test]
    fn test_displacement_triggers() {
        let sink = MemoryEventSink::new();
        let mut det = detector(thresholds(), 10, &sink);
        let t0 = Utc::now();

        let quiet = Sample::new(t0, Vec::new(), vec![-0.4]);
        assert_eq!(det.process(quiet).unwrap(), ProcessOutcome::Idle);
        let moved = Sample::new(t0 + Duration::milliseconds(200), Vec::new(), vec![-1.5]);
        assert_eq!(det.process(moved).unwrap(), ProcessOutcome::Started);
        assert!((det.metrics().disp_moving_avg - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_keep_latest_readings_per_stream() {
        let sink = MemoryEventSink::new();
        let mut det = detector(thresholds(), 10, &sink);
        let t0 = Utc::now();

        det.process(sample(t0, 0, IDLE)).unwrap();
        let lvdt_only = Sample::new(t0 + Duration::milliseconds(10), Vec::new(), vec![-0.4, 0.2]);
        det.process(lvdt_only).unwrap();

        let metrics = det.metrics();
        assert_eq!(metrics.last_acceleration, Some(AccelReading::new(0.0, 0.0, IDLE)));
        assert_eq!(metrics.last_displacement, Some(-0.4));
    }

    #[test]
    fn test_gravity_compensation() {
        let sink = MemoryEventSink::new();
        let mut settings = DetectorSettings::new(ThresholdSet::default(), 10, 100.0);
        settings.gravity_compensation = Some(crate::sensors::GRAVITY);
        let mut det = EventDetector::configure(settings, Box::new(sink.clone())).unwrap();
        let t0 = Utc::now();

        assert_eq!(det.process(sample(t0, 0, IDLE)).unwrap(), ProcessOutcome::Idle);
        assert_eq!(det.process(sample(t0, 1, 13.5)).unwrap(), ProcessOutcome::Started);
    }

    #[test]
    fn test_persist_failure_does_not_count() {
        let sink = MemoryEventSink::failing();
        let mut t = thresholds();
        t.post_event_seconds = 0.05;
        t.min_event_duration_seconds = 0.0;
        let mut det = detector(t, 10, &sink);
        let t0 = Utc::now();

        let outcomes = feed(&mut det, t0, 0, std::iter::once(BURST).chain(std::iter::repeat(IDLE).take(10)));
        assert_eq!(outcomes.last().map(|o| &o.1), Some(&ProcessOutcome::PersistFailed));
        assert_eq!(det.event_count(), 0);
        assert_eq!(det.metrics().failed_persists, 1);
        assert_eq!(det.state(), DetectorState::Idle);

        // detection keeps going
        let next = feed(&mut det, t0, 20, std::iter::once(BURST));
        assert_eq!(next, vec![(20, ProcessOutcome::Started)]);
    }

    #[test]
    fn test_finalize_persists_exactly_once() {
        let sink = MemoryEventSink::new();
        let mut det = detector(thresholds(), 10, &sink);
        let t0 = Utc::now();

        feed(&mut det, t0, 0, [IDLE, IDLE, BURST, IDLE]);
        assert!(det.is_recording());

        assert!(matches!(det.finalize(), Some(ProcessOutcome::Persisted(_))));
        assert!(det.finalize().is_none());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].len(), 4);
        assert_eq!(det.event_count(), 1);
    }

    #[test]
    fn test_finalize_when_idle_does_nothing() {
        let sink = MemoryEventSink::new();
        let mut det = detector(thresholds(), 10, &sink);
        feed(&mut det, Utc::now(), 0, [IDLE; 5]);
        assert!(det.finalize().is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_invalid_samples_are_counted_not_fatal() {
        let sink = MemoryEventSink::new();
        let mut settings = DetectorSettings::new(thresholds(), 10, 100.0);
        settings.max_errors = 3;
        let mut det = EventDetector::configure(settings, Box::new(sink.clone())).unwrap();
        let t0 = Utc::now();

        for i in 0..7 {
            let empty = Sample::new(t0 + Duration::milliseconds(i), Vec::new(), Vec::new());
            assert!(matches!(det.process(empty), Err(DetectionError::EmptySample)));
        }
        assert_eq!(det.consecutive_errors, 1);

        let bad = Sample::new(t0, vec![AccelReading::new(f64::NAN, 0.0, 0.0)], Vec::new());
        assert!(matches!(det.process(bad), Err(DetectionError::NonFinite("acceleration"))));
        assert_eq!(det.metrics().processing_errors, 8);

        assert_eq!(det.process(sample(t0, 1, IDLE)).unwrap(), ProcessOutcome::Idle);
        assert_eq!(det.consecutive_errors, 0);
        assert_eq!(det.metrics().samples_processed, 1);
    }

    #[test]
    fn test_configure_rejects_bad_settings() {
        let sink = MemoryEventSink::new();
        let zero_ring = DetectorSettings::new(thresholds(), 0, 100.0);
        assert!(EventDetector::configure(zero_ring, Box::new(sink.clone())).is_err());

        let mut inverted = thresholds();
        inverted.detrigger_displacement = 2.0;
        let settings = DetectorSettings::new(inverted, 10, 100.0);
        assert!(EventDetector::configure(settings, Box::new(sink)).is_err());
    }
}
