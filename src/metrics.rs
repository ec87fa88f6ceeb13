// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Read-only status snapshots published by the acquisition and detection threads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use crate::sensors::AccelReading;

/// Timing of one sensor stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetrics {
    pub enabled: bool,
    pub samples: u64,
    pub rate_hz: f64,
    pub jitter_ms: f64,
    pub jitter_exceeded: bool,
}

/// Published by the scheduler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetrics {
    pub acceleration: StreamMetrics,
    pub displacement: StreamMetrics,
    pub samples_pushed: u64,
    pub samples_dropped: u64,
    pub buffered: usize,
    pub transient_errors: u64,
    /// Set once the loop has stopped on repeated fatal errors
    pub failed: bool,
}

/// Published by the event detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    pub event_count: u64,
    pub is_recording: bool,
    pub samples_processed: u64,
    pub processing_errors: u64,
    pub discarded_events: u64,
    pub failed_persists: u64,
    pub current_event_samples: usize,
    pub accel_moving_avg: f64,
    pub disp_moving_avg: f64,
    pub last_trigger: Option<DateTime<Utc>>,

    /// First accelerometer of the latest sample that carried one
    pub last_acceleration: Option<AccelReading>,
    /// First LVDT channel of the latest sample that carried one, in mm
    pub last_displacement: Option<f64>,
}

/// Combined snapshot for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub taken_at: DateTime<Utc>,
    pub acquisition: AcquisitionMetrics,
    pub detection: DetectionMetrics,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let acq = &self.acquisition;
        let det = &self.detection;
        if acq.acceleration.enabled {
            write!(
                f,
                "accel {:.1} Hz (jitter {:.2} ms)",
                acq.acceleration.rate_hz, acq.acceleration.jitter_ms
            )?;
            if let Some(a) = &det.last_acceleration {
                write!(
                    f,
                    " |a| {:.3} m/s² (x {:.3}, y {:.3}, z {:.3})",
                    a.magnitude(),
                    a.x,
                    a.y,
                    a.z
                )?;
            }
            f.write_str(" | ")?;
        }
        if acq.displacement.enabled {
            write!(
                f,
                "lvdt {:.1} Hz (jitter {:.2} ms)",
                acq.displacement.rate_hz, acq.displacement.jitter_ms
            )?;
            if let Some(d) = det.last_displacement {
                write!(f, " {:.3} mm", d)?;
            }
            f.write_str(" | ")?;
        }
        write!(
            f,
            "events {} | {} | buffered {} | dropped {}",
            det.event_count,
            if det.is_recording { "RECORDING" } else { "idle" },
            acq.buffered,
            acq.samples_dropped
        )
    }
}

/// Publishing half, owned by one producer thread
pub type MetricsSender<T> = watch::Sender<T>;

/// Create the two metric channels and the reader that joins them
pub fn channels() -> (
    MetricsSender<AcquisitionMetrics>,
    MetricsSender<DetectionMetrics>,
    MetricsReader,
) {
    let (acq_tx, acq_rx) = watch::channel(AcquisitionMetrics::default());
    let (det_tx, det_rx) = watch::channel(DetectionMetrics::default());
    (acq_tx, det_tx, MetricsReader { acquisition: acq_rx, detection: det_rx })
}

/// Cloneable read handle for status collaborators
#[derive(Debug, Clone)]
pub struct MetricsReader {
    acquisition: watch::Receiver<AcquisitionMetrics>,
    detection: watch::Receiver<DetectionMetrics>,
}

impl MetricsReader {
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            taken_at: Utc::now(),
            acquisition: self.acquisition.borrow().clone(),
            detection: self.detection.borrow().clone(),
        }
    }
}
