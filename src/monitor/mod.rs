// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Monitoring session - owns the acquisition and detection threads

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::acquisition::{AcquisitionError, AcquisitionSummary, Clock, MonotonicClock, SampleBuffer, Scheduler};
use crate::config::Config;
use crate::detection::EventDetector;
use crate::metrics::{self, DetectionMetrics, Metrics, MetricsReader};
use crate::sensors;
use crate::storage::{JsonEventSink, JsonLinesSampleSink, SampleSink};

/// Detector sleep when the buffer is empty
const DETECTOR_POLL: Duration = Duration::from_micros(500);

/// Log every n-th raw-sample write failure after the first
const WRITE_ERROR_LOG_EVERY: u64 = 1000;

/// Raw-sample recording totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    pub samples_recorded: u64,
    pub write_errors: u64,
}

/// Totals for a finished session
#[derive(Debug, Clone)]
pub struct MonitorSummary {
    pub acquisition: AcquisitionSummary,
    pub detection: DetectionMetrics,
    pub recording: RecordingSummary,
    pub uptime: Duration,
}

pub struct Monitor {
    running: Arc<AtomicBool>,
    reader: MetricsReader,
    start_time: Instant,
    acquisition: Option<JoinHandle<Result<AcquisitionSummary, AcquisitionError>>>,
    detection: Option<JoinHandle<(DetectionMetrics, RecordingSummary)>>,
}

impl Monitor {
    /// Build every component from the configuration and start monitoring
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = sensors::build_source(config)?;
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let scheduler = Scheduler::configure(config.scheduler_settings(), source, clock)?;

        let sink = JsonEventSink::new(config.storage.events_dir())?;
        let detector = EventDetector::configure(config.detector_settings(), Box::new(sink))?;

        let samples: Option<Box<dyn SampleSink>> = if config.storage.record_samples {
            Some(Box::new(JsonLinesSampleSink::create(config.storage.samples_path())?))
        } else {
            None
        };

        Self::start(scheduler, detector, samples)
    }

    /// Spawn the acquisition and detection threads. Every sample taken off
    /// the buffer is handed to `samples` before the detector sees it.
    pub fn start(scheduler: Scheduler, detector: EventDetector, samples: Option<Box<dyn SampleSink>>) -> Result<Self> {
        let (acq_tx, det_tx, reader) = metrics::channels();
        let mut scheduler = scheduler.with_metrics(acq_tx);
        let mut detector = detector.with_metrics(det_tx);
        let buffer = scheduler.buffer();

        let running = Arc::new(AtomicBool::new(true));
        let acquisition_done = Arc::new(AtomicBool::new(false));

        let acquisition = {
            let running = Arc::clone(&running);
            let done = Arc::clone(&acquisition_done);
            std::thread::Builder::new().name("acquisition".into()).spawn(move || {
                let result = scheduler.run(&running);
                if result.is_err() {
                    running.store(false, Ordering::Release);
                }
                done.store(true, Ordering::Release);
                result
            })?
        };

        let detection = {
            let done = Arc::clone(&acquisition_done);
            std::thread::Builder::new()
                .name("detection".into())
                .spawn(move || detection_loop(&mut detector, samples, &buffer, &done))?
        };

        info!("Monitoring started");
        Ok(Self {
            running,
            reader,
            start_time: Instant::now(),
            acquisition: Some(acquisition),
            detection: Some(detection),
        })
    }

    pub fn metrics(&self) -> MetricsReader {
        self.reader.clone()
    }

    pub fn snapshot(&self) -> Metrics {
        self.reader.snapshot()
    }

    /// False once stopped or after acquisition failed
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Ask both threads to finish. Returns immediately.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Join both threads and report totals.
    ///
    /// The detector drains the buffer and finalizes any open event before
    /// this returns, even when acquisition failed.
    pub fn wait(mut self) -> Result<MonitorSummary> {
        let acquisition = self
            .acquisition
            .take()
            .ok_or_else(|| anyhow!("acquisition thread already joined"))?
            .join()
            .map_err(|_| anyhow!("acquisition thread panicked"))?;
        let (detection, recording) = self
            .detection
            .take()
            .ok_or_else(|| anyhow!("detection thread already joined"))?
            .join()
            .map_err(|_| anyhow!("detection thread panicked"))?;

        let acquisition = match acquisition {
            Ok(summary) => summary,
            Err(e) => {
                error!("Monitoring ended on acquisition failure: {}", e);
                return Err(e.into());
            }
        };

        let summary = MonitorSummary {
            acquisition,
            detection,
            recording,
            uptime: self.uptime(),
        };
        info!(
            "Session summary: {} events, {} accel / {} lvdt samples, {} dropped, {} discarded events, uptime {:.1}s",
            summary.detection.event_count,
            summary.acquisition.accel_samples,
            summary.acquisition.displacement_samples,
            summary.acquisition.samples_dropped,
            summary.detection.discarded_events,
            summary.uptime.as_secs_f64()
        );
        Ok(summary)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consume samples until acquisition has finished and the buffer is empty
fn detection_loop(
    detector: &mut EventDetector,
    mut samples: Option<Box<dyn SampleSink>>,
    buffer: &SampleBuffer,
    acquisition_done: &AtomicBool,
) -> (DetectionMetrics, RecordingSummary) {
    let mut recording = RecordingSummary::default();
    loop {
        match buffer.pop_oldest() {
            Some(sample) => {
                if let Some(sink) = samples.as_mut() {
                    match sink.record(&sample) {
                        Ok(()) => recording.samples_recorded += 1,
                        Err(e) => {
                            recording.write_errors += 1;
                            if recording.write_errors == 1 || recording.write_errors % WRITE_ERROR_LOG_EVERY == 0 {
                                warn!("Raw sample write failed ({} total): {}", recording.write_errors, e);
                            }
                        }
                    }
                }
                // rejected samples are counted by the detector
                let _ = detector.process(sample);
            }
            None if acquisition_done.load(Ordering::Acquire) => {
                if buffer.is_empty() {
                    break;
                }
            }
            None => std::thread::sleep(DETECTOR_POLL),
        }
    }
    detector.finalize();
    if let Some(sink) = samples.as_mut() {
        if let Err(e) = sink.flush() {
            error!("Failed to flush raw samples: {}", e);
        }
    }
    (detector.metrics(), recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{ManualClock, Sample, SchedulerSettings};
    use crate::detection::{DetectorSettings, ThresholdSet};
    use crate::sensors::{AccelReading, SensorError, SensorSimulator, SensorSource, SimulationConfig};
    use crate::storage::{MemoryEventSink, PersistError};
    use chrono::Utc;
    use std::sync::atomic::AtomicU64;

    struct ConstantSource {
        magnitude: f64,
        fail: bool,
    }

    impl SensorSource for ConstantSource {
        fn name(&self) -> &str {
            "constant"
        }

        fn has_accelerometers(&self) -> bool {
            true
        }

        fn has_displacement(&self) -> bool {
            false
        }

        fn read_acceleration(&mut self) -> Result<Vec<AccelReading>, SensorError> {
            if self.fail {
                Err(SensorError::Unavailable("bus fault".into()))
            } else {
                Ok(vec![AccelReading::new(0.0, 0.0, self.magnitude)])
            }
        }

        fn read_displacement(&mut self) -> Result<Vec<f64>, SensorError> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone, Default)]
    struct CountingSink(Arc<AtomicU64>);

    impl SampleSink for CountingSink {
        fn record(&mut self, _sample: &Sample) -> Result<(), PersistError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct FailingSink;

    impl SampleSink for FailingSink {
        fn record(&mut self, _sample: &Sample) -> Result<(), PersistError> {
            Err(PersistError::Rejected("disk full".into()))
        }
    }

    fn scheduler(source: Box<dyn SensorSource>) -> Scheduler {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        Scheduler::configure(SchedulerSettings::new(200.0, 5.0, 1000), source, clock).unwrap()
    }

    fn detector(sink: &MemoryEventSink, thresholds: ThresholdSet) -> EventDetector {
        EventDetector::configure(DetectorSettings::new(thresholds, 100, 200.0), Box::new(sink.clone())).unwrap()
    }

    #[test]
    fn test_every_buffered_sample_is_processed() {
        let sim = SensorSimulator::new(1, &[Default::default()], SimulationConfig { seed: Some(7), ..Default::default() });
        let sink = MemoryEventSink::new();
        let raw = CountingSink::default();
        let monitor = Monitor::start(
            scheduler(Box::new(sim)),
            detector(&sink, ThresholdSet::default()),
            Some(Box::new(raw.clone())),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        monitor.stop();
        let summary = monitor.wait().unwrap();

        let acq = &summary.acquisition;
        assert!(acq.samples_pushed > 0);
        assert_eq!(summary.detection.samples_processed, acq.samples_pushed - acq.samples_dropped);
        assert_eq!(summary.recording.samples_recorded, summary.detection.samples_processed);
        assert_eq!(summary.recording.write_errors, 0);
        assert_eq!(raw.0.load(Ordering::Relaxed), summary.recording.samples_recorded);
    }

    #[test]
    fn test_open_event_is_finalized_on_stop() {
        let sink = MemoryEventSink::new();
        let source = ConstantSource { magnitude: 12.0, fail: false };
        let monitor = Monitor::start(
            scheduler(Box::new(source)),
            detector(&sink, ThresholdSet::from_triggers(10.79, 1.0)),
            Some(Box::new(FailingSink)),
        )
        .unwrap();

        let metrics = monitor.metrics();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !metrics.snapshot().detection.is_recording && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(metrics.snapshot().detection.is_recording);
        monitor.stop();
        let summary = monitor.wait().unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(summary.detection.event_count, 1);
        assert!(!summary.detection.is_recording);
        // raw-sample failures never hold up detection
        assert_eq!(summary.recording.samples_recorded, 0);
        assert_eq!(summary.recording.write_errors, summary.detection.samples_processed);
    }

    #[test]
    fn test_fatal_acquisition_stops_session() {
        let sink = MemoryEventSink::new();
        let source = ConstantSource { magnitude: 0.0, fail: true };
        let monitor = Monitor::start(scheduler(Box::new(source)), detector(&sink, ThresholdSet::default()), None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!monitor.is_running());
        assert!(monitor.metrics().snapshot().acquisition.failed);
        assert!(monitor.wait().is_err());
    }
}
