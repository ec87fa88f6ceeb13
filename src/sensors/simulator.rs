// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Sensor simulator for demo/testing

use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;

use super::calibration::LvdtCalibration;
use super::{AccelReading, SensorError, SensorSource};

/// Standard gravity in m/s²
pub const GRAVITY: f64 = 9.81;

/// ADS1115 resolution at gain 2/3, mV per LSB
const ADC_MV_PER_LSB: f64 = 0.1875;

const LVDT_NOISE_MM: f64 = 0.1;

/// Tunables for the simulated source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed RNG seed, random when unset
    pub seed: Option<u64>,

    /// Multiplier applied to the vibration burst signal
    pub vibration_gain: f64,

    /// Minimum seconds between noise/vibration state changes
    pub min_state_secs: f64,

    /// Maximum seconds between noise/vibration state changes
    pub max_state_secs: f64,

    /// LVDT sine amplitude in mm
    pub lvdt_amplitude_mm: f64,

    /// LVDT sine frequency in Hz
    pub lvdt_frequency_hz: f64,

    /// Probability that any single read fails transiently
    pub read_failure_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            vibration_gain: 4.0,
            min_state_secs: 30.0,
            max_state_secs: 35.0,
            lvdt_amplitude_mm: 0.5,
            lvdt_frequency_hz: 0.1,
            read_failure_probability: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VibrationState {
    Noise,
    Burst,
}

/// Simulated MPU6050: gravity on z, constant low-level hum and
/// periodic vibration bursts that decay over 100 reads.
struct SimulatedAccelerometer {
    state: VibrationState,
    cycle_start: f64,
    interval: f64,
    decay: f64,
}

impl SimulatedAccelerometer {
    fn read(&mut self, now: f64, gain: f64, next_interval: f64) -> AccelReading {
        let mut t = now - self.cycle_start;
        if t >= self.interval {
            self.cycle_start = now;
            self.interval = next_interval;
            self.state = match self.state {
                VibrationState::Noise => VibrationState::Burst,
                VibrationState::Burst => VibrationState::Noise,
            };
            self.decay = 0.0;
            t = 0.0;
        }
        self.decay = (self.decay + 0.01).min(1.0);

        let hum_x = 0.005 * (t * 2.0 * PI * 50.0).sin() + 0.003 * (t * 2.0 * PI * 80.0).sin();
        let hum_y = 0.006 * (t * 2.0 * PI * 60.0).cos() + 0.004 * (t * 2.0 * PI * 100.0).cos();
        let hum_z = 0.007 * (t * 2.0 * PI * 70.0).sin() + 0.005 * (t * 2.0 * PI * 90.0).cos();

        let mut reading = AccelReading::new(hum_x, hum_y, GRAVITY + hum_z);

        if self.state == VibrationState::Burst {
            let envelope = gain * (1.0 - self.decay);
            reading.x += envelope * (0.75 * (t * 2.0 * PI * 18.0).sin() + 0.05 * (t * 2.0 * PI * 43.0).sin());
            reading.y += envelope * (0.05 * (t * 2.0 * PI * 19.0).cos() + 0.55 * (t * 2.0 * PI * 42.0).cos());
            reading.z += envelope * (0.75 * (t * 2.0 * PI * 21.0).sin() + 0.05 * (t * 2.0 * PI * 40.0).sin());
        }

        reading
    }
}

/// Simulated LVDT behind an ADS1115 channel
struct SimulatedLvdt {
    channel: usize,
    calibration: LvdtCalibration,
}

impl SimulatedLvdt {
    fn voltage(&self, displacement: f64) -> f64 {
        let voltage = self.calibration.voltage(displacement);
        let raw = ((voltage * 1000.0) / ADC_MV_PER_LSB) as i64;
        let raw = raw.clamp(i16::MIN as i64, i16::MAX as i64);
        raw as f64 * ADC_MV_PER_LSB / 1000.0
    }
}

/// Simulates a structure instrumented with accelerometers and LVDTs
pub struct SensorSimulator {
    name: String,
    config: SimulationConfig,
    origin: Instant,
    rng: StdRng,
    accelerometers: Vec<SimulatedAccelerometer>,
    lvdts: Vec<SimulatedLvdt>,
}

impl SensorSimulator {
    pub fn new(
        num_accelerometers: usize,
        lvdt_calibration: &[LvdtCalibration],
        config: SimulationConfig,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let accelerometers = (0..num_accelerometers)
            .map(|_| SimulatedAccelerometer {
                state: VibrationState::Noise,
                cycle_start: 0.0,
                interval: Self::state_interval(&mut rng, &config),
                decay: 0.0,
            })
            .collect();

        let lvdts = lvdt_calibration
            .iter()
            .enumerate()
            .map(|(channel, calibration)| SimulatedLvdt {
                channel,
                calibration: *calibration,
            })
            .collect();

        Self {
            name: format!("simulator({} accel, {} lvdt)", num_accelerometers, lvdt_calibration.len()),
            config,
            origin: Instant::now(),
            rng,
            accelerometers,
            lvdts,
        }
    }

    fn state_interval(rng: &mut StdRng, config: &SimulationConfig) -> f64 {
        if config.max_state_secs > config.min_state_secs {
            rng.gen_range(config.min_state_secs..config.max_state_secs)
        } else {
            config.min_state_secs
        }
    }

    fn elapsed(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn maybe_fail(&mut self, what: &str) -> Result<(), SensorError> {
        if self.config.read_failure_probability > 0.0
            && self.rng.gen::<f64>() < self.config.read_failure_probability
        {
            return Err(SensorError::Transient(format!("simulated {} glitch", what)));
        }
        Ok(())
    }
}

impl SensorSource for SensorSimulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_accelerometers(&self) -> bool {
        !self.accelerometers.is_empty()
    }

    fn has_displacement(&self) -> bool {
        !self.lvdts.is_empty()
    }

    fn read_acceleration(&mut self) -> Result<Vec<AccelReading>, SensorError> {
        self.maybe_fail("accelerometer")?;
        let now = self.elapsed();
        let gain = self.config.vibration_gain;
        let mut readings = Vec::with_capacity(self.accelerometers.len());
        for i in 0..self.accelerometers.len() {
            let next = Self::state_interval(&mut self.rng, &self.config);
            readings.push(self.accelerometers[i].read(now, gain, next));
        }
        Ok(readings)
    }

    fn read_displacement(&mut self) -> Result<Vec<f64>, SensorError> {
        self.maybe_fail("lvdt")?;
        let now = self.elapsed();
        let omega = 2.0 * PI * self.config.lvdt_frequency_hz;
        let amplitude = self.config.lvdt_amplitude_mm;

        let mut readings = Vec::with_capacity(self.lvdts.len());
        for lvdt in &self.lvdts {
            let phase = lvdt.channel as f64 * (PI / 4.0);
            let noise: f64 = self.rng.sample::<f64, _>(StandardNormal) * LVDT_NOISE_MM;
            let displacement = amplitude * (omega * now + phase).sin() + noise;
            let voltage = lvdt.voltage(displacement);
            readings.push(lvdt.calibration.displacement(voltage));
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_shape_matches_configuration() {
        let mut sim = SensorSimulator::new(2, &[LvdtCalibration::default(); 3], seeded());
        assert!(sim.has_accelerometers());
        assert!(sim.has_displacement());
        assert_eq!(sim.read_acceleration().unwrap().len(), 2);
        assert_eq!(sim.read_displacement().unwrap().len(), 3);
    }

    #[test]
    fn test_idle_accelerometer_reads_gravity() {
        let mut sim = SensorSimulator::new(1, &[], seeded());
        let reading = sim.read_acceleration().unwrap()[0];
        assert!((reading.magnitude() - GRAVITY).abs() < 0.05);
        assert!(!sim.has_displacement());
    }

    #[test]
    fn test_displacement_stays_near_amplitude() {
        let mut sim = SensorSimulator::new(0, &[LvdtCalibration::default()], seeded());
        for _ in 0..100 {
            let d = sim.read_displacement().unwrap()[0];
            assert!(d.abs() < 0.5 + 1.0);
        }
    }

    #[test]
    fn test_burst_decays_to_hum() {
        let mut accel = SimulatedAccelerometer {
            state: VibrationState::Noise,
            cycle_start: 0.0,
            interval: 1.0,
            decay: 0.0,
        };
        // crossing the interval switches to a burst
        accel.read(1.0, 4.0, 1.0);
        assert_eq!(accel.state, VibrationState::Burst);
        for i in 0..200 {
            accel.read(1.0 + i as f64 * 0.001, 4.0, 1.0);
        }
        let quiet = accel.read(1.25, 4.0, 1.0);
        assert!((quiet.magnitude() - GRAVITY).abs() < 0.05);
    }

    #[test]
    fn test_injected_failures_are_transient() {
        let mut sim = SensorSimulator::new(
            1,
            &[],
            SimulationConfig {
                read_failure_probability: 1.0,
                ..seeded()
            },
        );
        let err = sim.read_acceleration().unwrap_err();
        assert!(!err.is_fatal());
    }
}
