// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Detection module - event trigger state machine and captures

mod detector;
mod event;
mod moving_average;

pub use detector::{
    DetectionError, DetectorSettings, DetectorState, EventDetector, ProcessOutcome, DEFAULT_DISPLACEMENT_WINDOW,
    DEFAULT_MAX_ERRORS, DEFAULT_PRE_TRIGGER_CAPACITY,
};
pub use event::{Event, ThresholdSet};
pub use moving_average::MovingAverage;
