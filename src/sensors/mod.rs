// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Sensor module - sensor source abstraction, calibration and simulation

mod calibration;
mod simulator;
mod traits;

pub use calibration::{calibrate_all, AccelCalibration, LvdtCalibration, DEFAULT_LVDT_SLOPE};
pub use simulator::{SensorSimulator, SimulationConfig, GRAVITY};
pub use traits::{AccelReading, SensorError, SensorSource};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;

/// Which sensor source backs a monitoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Hardware,
}

/// Build the sensor source selected by the configuration.
///
/// The choice is made once here; nothing downstream knows which variant it got.
pub fn build_source(config: &Config) -> Result<Box<dyn SensorSource>> {
    let sampling = &config.sampling;
    let num_accel = if sampling.enable_accel { sampling.num_accelerometers } else { 0 };
    let lvdts: Vec<LvdtCalibration> = if sampling.enable_displacement {
        (0..sampling.num_lvdts)
            .map(|i| config.calibration.lvdt.get(i).copied().unwrap_or_default())
            .collect()
    } else {
        Vec::new()
    };

    match sampling.source {
        SourceKind::Simulated => {
            let sim = SensorSimulator::new(num_accel, &lvdts, config.simulation.clone());
            info!("Using simulated sensors: {}", sim.name());
            Ok(Box::new(sim))
        }
        SourceKind::Hardware => {
            bail!(
                "hardware source requested but this build ships no I2C/ADC drivers; \
                 provide a SensorSource implementation or use source = \"simulated\""
            )
        }
    }
}
