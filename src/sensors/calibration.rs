// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Per-sensor calibration data

use serde::{Deserialize, Serialize};

use super::AccelReading;

/// Default LVDT transfer slope in mm/V
pub const DEFAULT_LVDT_SLOPE: f64 = 19.86;

/// Accelerometer correction, applied as `(raw + offset) * scaling_factor`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelCalibration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub scaling_factor: f64,
}

impl Default for AccelCalibration {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            scaling_factor: 1.0,
        }
    }
}

impl AccelCalibration {
    pub fn apply(&self, raw: AccelReading) -> AccelReading {
        AccelReading {
            x: (raw.x + self.x) * self.scaling_factor,
            y: (raw.y + self.y) * self.scaling_factor,
            z: (raw.z + self.z) * self.scaling_factor,
        }
    }
}

/// Calibrate a full accelerometer read. Sensors without an entry pass through.
pub fn calibrate_all(calibration: &[AccelCalibration], raw: Vec<AccelReading>) -> Vec<AccelReading> {
    raw.into_iter()
        .enumerate()
        .map(|(i, reading)| match calibration.get(i) {
            Some(cal) => cal.apply(reading),
            None => reading,
        })
        .collect()
}

/// Linear LVDT voltage to displacement conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LvdtCalibration {
    /// mm per volt
    pub slope: f64,
    /// mm
    pub intercept: f64,
}

impl Default for LvdtCalibration {
    fn default() -> Self {
        Self {
            slope: DEFAULT_LVDT_SLOPE,
            intercept: 0.0,
        }
    }
}

impl LvdtCalibration {
    pub fn displacement(&self, voltage: f64) -> f64 {
        self.slope * voltage + self.intercept
    }

    pub fn voltage(&self, displacement: f64) -> f64 {
        if self.slope == 0.0 {
            0.0
        } else {
            (displacement - self.intercept) / self.slope
        }
    }
}
