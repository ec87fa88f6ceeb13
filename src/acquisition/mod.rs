// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Fixed-rate sensor acquisition

mod buffer;
mod clock;
mod performance;
mod sample;
mod scheduler;

pub use buffer::{SampleBuffer, DEFAULT_BUFFER_CAPACITY};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use performance::{rate_and_jitter, PerformanceConfig, StreamPerformance, DEFAULT_PERIOD_WINDOW};
pub use sample::Sample;
pub use scheduler::{
    AcquisitionError, AcquisitionSummary, Scheduler, SchedulerSettings, StreamClock, MAX_CONSECUTIVE_FATAL,
};
