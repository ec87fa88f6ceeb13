// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Sensor traits and common types

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One accelerometer reading in m/s²
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Euclidean norm of the three axes
    pub fn magnitude(&self) -> f64 {
        self.as_vector().norm()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Errors reported by a sensor source
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    /// A single read failed; the next read may succeed
    #[error("transient read failure: {0}")]
    Transient(String),

    /// The device cannot be reached at all
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

impl SensorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SensorError::Unavailable(_))
    }
}

/// Source of displacement and acceleration readings.
///
/// Implementations are driven from the acquisition thread only. A read that
/// blocks stalls the scheduler tick, so implementations that talk to slow
/// buses are expected to bound their own call time.
pub trait SensorSource: Send {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Whether this source has at least one accelerometer
    fn has_accelerometers(&self) -> bool;

    /// Whether this source has at least one displacement channel
    fn has_displacement(&self) -> bool;

    /// Read every accelerometer, in sensor order
    fn read_acceleration(&mut self) -> Result<Vec<AccelReading>, SensorError>;

    /// Read every displacement channel in mm, in channel order
    fn read_displacement(&mut self) -> Result<Vec<f64>, SensorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude() {
        let reading = AccelReading::new(3.0, 4.0, 12.0);
        assert!((reading.magnitude() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SensorError::Unavailable("bus".into()).is_fatal());
        assert!(!SensorError::Transient("crc".into()).is_fatal());
    }

    #[test]
    fn test_non_finite_reading() {
        assert!(AccelReading::new(0.0, 0.0, 9.81).is_finite());
        assert!(!AccelReading::new(f64::NAN, 0.0, 9.81).is_finite());
    }
}
