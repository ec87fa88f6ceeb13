// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Composite acquisition sample

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensors::AccelReading;

/// Everything acquired in one scheduler tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,

    /// One entry per accelerometer, empty when the stream was not due or failed
    pub acceleration: Vec<AccelReading>,

    /// One entry per LVDT channel in mm, empty when not due or failed
    pub displacement: Vec<f64>,

    /// Seconds from the start of the event this sample was persisted in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_time: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, acceleration: Vec<AccelReading>, displacement: Vec<f64>) -> Self {
        Self {
            timestamp,
            acceleration,
            displacement,
            expected_time: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.acceleration.is_empty() && self.displacement.is_empty()
    }

    pub fn first_acceleration(&self) -> Option<&AccelReading> {
        self.acceleration.first()
    }

    pub fn first_displacement(&self) -> Option<f64> {
        self.displacement.first().copied()
    }
}
