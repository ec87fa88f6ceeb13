// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Fixed-window running mean

use std::collections::VecDeque;

/// Mean over the last `window` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f64>,
    window: usize,
    sum: f64,
}

impl MovingAverage {
    /// A window of zero is raised to one
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            values: VecDeque::with_capacity(window),
            window,
            sum: 0.0,
        }
    }

    /// Window sized to cover `seconds` of samples at `rate_hz`
    pub fn for_duration(seconds: f64, rate_hz: f64) -> Self {
        let len = (seconds * rate_hz).round();
        Self::new(if len.is_finite() && len >= 1.0 { len as usize } else { 1 })
    }

    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.window {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.value()
    }

    pub fn value(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f64
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
