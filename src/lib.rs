// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! StructWatch - structural health monitoring
//!
//! Samples accelerometers and LVDT displacement transducers at fixed rates,
//! detects transient structural events with a trigger/detrigger state machine
//! and persists each event with its pre-trigger context.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │ SensorSource │ → │ Scheduler │ → │ SampleBuffer │ → │ Detector  │ → EventSink
//! └──────────────┘   └───────────┘   └──────────────┘   └───────────┘
//!                     acquisition thread                 detection thread
//!                          ↓                                  ↓
//!                     ┌──────────────────────────────────────────┐
//!                     │            Metrics (watch)               │
//!                     └──────────────────────────────────────────┘
//! ```
//!
//! The detection thread also hands every sample to an optional `SampleSink`
//! for continuous raw-data recording.

pub mod acquisition;
pub mod config;
pub mod detection;
pub mod metrics;
pub mod monitor;
pub mod sensors;
pub mod storage;

// Re-exports for convenience
pub use acquisition::{Clock, MonotonicClock, Sample, SampleBuffer, Scheduler, SchedulerSettings};
pub use config::Config;
pub use detection::{Event, EventDetector, ThresholdSet};
pub use metrics::{Metrics, MetricsReader};
pub use monitor::Monitor;
pub use sensors::{AccelReading, SensorSource};
pub use storage::{EventSink, JsonEventSink, JsonLinesSampleSink, SampleSink};

/// StructWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
