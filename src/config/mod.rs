// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::acquisition::{PerformanceConfig, SchedulerSettings, DEFAULT_BUFFER_CAPACITY};
use crate::detection::{
    DetectionError, DetectorSettings, ThresholdSet, DEFAULT_DISPLACEMENT_WINDOW, DEFAULT_MAX_ERRORS,
    DEFAULT_PRE_TRIGGER_CAPACITY,
};
use crate::sensors::{AccelCalibration, LvdtCalibration, SimulationConfig, SourceKind, GRAVITY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{stream} rate must be a positive number of Hz, got {value}")]
    InvalidRate { stream: &'static str, value: f64 },

    #[error("{0} must be at least 1")]
    ZeroCapacity(&'static str),

    #[error("no sensor stream enabled")]
    NoStreams,

    #[error("{name} must be a finite number of seconds >= 0, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error(transparent)]
    Thresholds(#[from] DetectionError),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub detection: DetectionConfig,
    pub calibration: CalibrationConfig,
    pub performance: PerformanceConfig,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("structwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sampling;
        if !s.enable_accel && !s.enable_displacement {
            return Err(ConfigError::NoStreams);
        }
        // the accel rate also sets the event sample period
        check_rate("accelerometer", s.accel_rate_hz)?;
        if s.enable_displacement {
            check_rate("displacement", s.displacement_rate_hz)?;
        }
        if s.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("sampling.buffer_capacity"));
        }
        if s.enable_accel && s.num_accelerometers == 0 {
            return Err(ConfigError::ZeroCapacity("sampling.num_accelerometers"));
        }
        if s.enable_displacement && s.num_lvdts == 0 {
            return Err(ConfigError::ZeroCapacity("sampling.num_lvdts"));
        }
        if self.detection.pre_trigger_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("detection.pre_trigger_capacity"));
        }
        for (name, value) in [
            ("performance.stats_interval_secs", self.performance.stats_interval_secs),
            ("performance.status_interval_secs", self.performance.status_interval_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidInterval { name, value });
            }
        }
        self.detection.thresholds().validate()?;
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            accel_rate_hz: self.sampling.accel_rate_hz,
            displacement_rate_hz: self.sampling.displacement_rate_hz,
            buffer_capacity: self.sampling.buffer_capacity,
            accel_calibration: self.calibration.accelerometers.clone(),
            performance: self.performance.clone(),
        }
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        let d = &self.detection;
        DetectorSettings {
            thresholds: d.thresholds(),
            pre_trigger_capacity: d.pre_trigger_capacity,
            accel_rate_hz: self.sampling.accel_rate_hz,
            displacement_window: d.displacement_window,
            max_errors: d.max_errors,
            gravity_compensation: d.gravity_compensation.then_some(GRAVITY),
        }
    }
}

fn check_rate(stream: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { stream, value })
    }
}

/// Sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub accel_rate_hz: f64,
    pub displacement_rate_hz: f64,

    /// Samples held between acquisition and detection
    pub buffer_capacity: usize,

    pub enable_accel: bool,
    pub enable_displacement: bool,
    pub num_accelerometers: usize,
    pub num_lvdts: usize,
    pub source: SourceKind,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            accel_rate_hz: 200.0,
            displacement_rate_hz: 5.0,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            enable_accel: true,
            enable_displacement: true,
            num_accelerometers: 2,
            num_lvdts: 2,
            source: SourceKind::Simulated,
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// m/s²
    pub trigger_acceleration: f64,
    pub detrigger_acceleration: f64,

    /// mm
    pub trigger_displacement: f64,
    pub detrigger_displacement: f64,

    pub pre_event_seconds: f64,
    pub post_event_seconds: f64,
    pub min_event_duration_seconds: f64,

    pub pre_trigger_capacity: usize,
    pub displacement_window: usize,
    pub max_errors: u32,

    /// Compare `| |a| - g |` against the acceleration trigger
    pub gravity_compensation: bool,
}

impl DetectionConfig {
    pub fn thresholds(&self) -> ThresholdSet {
        ThresholdSet {
            trigger_acceleration: self.trigger_acceleration,
            detrigger_acceleration: self.detrigger_acceleration,
            trigger_displacement: self.trigger_displacement,
            detrigger_displacement: self.detrigger_displacement,
            pre_event_seconds: self.pre_event_seconds,
            post_event_seconds: self.post_event_seconds,
            min_event_duration_seconds: self.min_event_duration_seconds,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let t = ThresholdSet::default();
        Self {
            trigger_acceleration: t.trigger_acceleration,
            detrigger_acceleration: t.detrigger_acceleration,
            trigger_displacement: t.trigger_displacement,
            detrigger_displacement: t.detrigger_displacement,
            pre_event_seconds: t.pre_event_seconds,
            post_event_seconds: t.post_event_seconds,
            min_event_duration_seconds: t.min_event_duration_seconds,
            pre_trigger_capacity: DEFAULT_PRE_TRIGGER_CAPACITY,
            displacement_window: DEFAULT_DISPLACEMENT_WINDOW,
            max_errors: DEFAULT_MAX_ERRORS,
            gravity_compensation: true,
        }
    }
}

/// Per-sensor calibration, indexed by sensor position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub accelerometers: Vec<AccelCalibration>,
    pub lvdt: Vec<LvdtCalibration>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            accelerometers: vec![AccelCalibration::default(); 2],
            lvdt: vec![LvdtCalibration::default(); 2],
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub events_subdir: String,

    /// Append every acquired sample to `samples_file`
    pub record_samples: bool,
    pub samples_file: String,
}

impl StorageConfig {
    pub fn events_dir(&self) -> PathBuf {
        self.output_dir.join(&self.events_subdir)
    }

    pub fn samples_path(&self) -> PathBuf {
        self.output_dir.join(&self.samples_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./repository").join(chrono::Local::now().format("%Y%m%d").to_string()),
            events_subdir: "events".to_string(),
            record_samples: true,
            samples_file: "samples.jsonl".to_string(),
        }
    }
}
