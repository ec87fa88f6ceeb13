// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Trigger thresholds and completed event captures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::DetectionError;
use crate::acquisition::Sample;
use crate::sensors::GRAVITY;

/// Trigger/detrigger levels and event windows, fixed for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Acceleration magnitude in m/s² that starts an event
    pub trigger_acceleration: f64,
    pub detrigger_acceleration: f64,

    /// Absolute displacement in mm that starts an event
    pub trigger_displacement: f64,
    pub detrigger_displacement: f64,

    pub pre_event_seconds: f64,
    pub post_event_seconds: f64,
    pub min_event_duration_seconds: f64,
}

impl ThresholdSet {
    /// Thresholds with detrigger levels at half the trigger levels
    pub fn from_triggers(trigger_acceleration: f64, trigger_displacement: f64) -> Self {
        Self {
            trigger_acceleration,
            detrigger_acceleration: trigger_acceleration * 0.5,
            trigger_displacement,
            detrigger_displacement: trigger_displacement * 0.5,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        let levels = [
            ("trigger_acceleration", self.trigger_acceleration),
            ("detrigger_acceleration", self.detrigger_acceleration),
            ("trigger_displacement", self.trigger_displacement),
            ("detrigger_displacement", self.detrigger_displacement),
            ("pre_event_seconds", self.pre_event_seconds),
            ("post_event_seconds", self.post_event_seconds),
            ("min_event_duration_seconds", self.min_event_duration_seconds),
        ];
        for (name, value) in levels {
            if !value.is_finite() || value < 0.0 {
                return Err(DetectionError::InvalidSettings(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if self.detrigger_acceleration > self.trigger_acceleration {
            return Err(DetectionError::InvalidSettings(format!(
                "detrigger_acceleration {} exceeds trigger_acceleration {}",
                self.detrigger_acceleration, self.trigger_acceleration
            )));
        }
        if self.detrigger_displacement > self.trigger_displacement {
            return Err(DetectionError::InvalidSettings(format!(
                "detrigger_displacement {} exceeds trigger_displacement {}",
                self.detrigger_displacement, self.trigger_displacement
            )));
        }
        Ok(())
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            trigger_acceleration: 0.3 * GRAVITY,
            detrigger_acceleration: 0.15 * GRAVITY,
            trigger_displacement: 1.0,
            detrigger_displacement: 0.5,
            pre_event_seconds: 5.0,
            post_event_seconds: 15.0,
            min_event_duration_seconds: 2.0,
        }
    }
}

/// A completed capture, handed to an `EventSink`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Nominal accelerometer period used for duration and relative times
    pub sample_period: f64,

    /// Deduplicated by timestamp, each carrying its `expected_time`
    pub samples: Vec<Sample>,
}

impl Event {
    /// Build an event from the recorded samples.
    ///
    /// Samples sharing a timestamp collapse to the first one. Returns `None`
    /// when nothing was recorded.
    pub fn from_recording(samples: Vec<Sample>, sample_period: f64) -> Option<Self> {
        let mut seen = HashSet::with_capacity(samples.len());
        let mut samples: Vec<Sample> = samples
            .into_iter()
            .filter(|s| seen.insert(s.timestamp))
            .collect();

        for (index, sample) in samples.iter_mut().enumerate() {
            sample.expected_time = Some(index as f64 * sample_period);
        }

        let start_time = samples.first()?.timestamp;
        Some(Self {
            id: Uuid::new_v4(),
            start_time,
            duration_seconds: samples.len() as f64 * sample_period,
            sample_period,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.samples.last().map(|s| s.timestamp).unwrap_or(self.start_time)
    }

    /// Largest magnitude of the first accelerometer
    pub fn peak_acceleration(&self) -> Option<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.first_acceleration().map(|a| a.magnitude()))
            .reduce(f64::max)
    }

    /// Largest absolute reading of the first LVDT channel
    pub fn peak_displacement(&self) -> Option<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.first_displacement().map(f64::abs))
            .reduce(f64::max)
    }
}
