// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/structwatch

//! Event and raw-sample persistence

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::acquisition::Sample;
use crate::detection::Event;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event has no samples")]
    EmptyEvent,

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Opaque token for a persisted event, typically its file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandle(pub String);

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination for completed events. Failures are reported, never retried here.
pub trait EventSink: Send {
    fn persist(&mut self, event: Event) -> Result<EventHandle, PersistError>;
}

/// On-disk layout of one event file
#[derive(Serialize)]
struct EventRecord<'a> {
    id: Uuid,
    index: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_seconds: f64,
    sample_period: f64,
    sample_count: usize,
    peak_acceleration: Option<f64>,
    peak_displacement: Option<f64>,
    samples: &'a [Sample],
}

/// Writes each event to `<dir>/event_<n>_<YYYYmmdd_HHMMSS>.json`
pub struct JsonEventSink {
    dir: PathBuf,
    next_index: u64,
}

impl JsonEventSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!("Event files: {}", dir.display());
        Ok(Self { dir, next_index: 1 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn filename(&self, event: &Event) -> PathBuf {
        self.dir.join(format!(
            "event_{}_{}.json",
            self.next_index,
            event.start_time.format("%Y%m%d_%H%M%S")
        ))
    }
}

impl EventSink for JsonEventSink {
    fn persist(&mut self, event: Event) -> Result<EventHandle, PersistError> {
        if event.is_empty() {
            return Err(PersistError::EmptyEvent);
        }
        let path = self.filename(&event);
        let record = EventRecord {
            id: event.id,
            index: self.next_index,
            start_time: event.start_time,
            end_time: event.end_time(),
            duration_seconds: event.duration_seconds,
            sample_period: event.sample_period,
            sample_count: event.len(),
            peak_acceleration: event.peak_acceleration(),
            peak_displacement: event.peak_displacement(),
            samples: &event.samples,
        };

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.flush()?;

        debug!("Wrote {} samples to {}", event.len(), path.display());
        self.next_index += 1;
        Ok(EventHandle(path.display().to_string()))
    }
}

/// Keeps events in memory; useful for replay and tests
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<Event>>>,
    fail: bool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every `persist` fails
    pub fn failing() -> Self {
        Self {
            events: Arc::default(),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemoryEventSink {
    fn persist(&mut self, event: Event) -> Result<EventHandle, PersistError> {
        if self.fail {
            return Err(PersistError::Rejected("sink configured to fail".into()));
        }
        let handle = EventHandle(event.id.to_string());
        self.events.lock().push(event);
        Ok(handle)
    }
}

/// Destination for every acquired sample. Fed from the detection thread so
/// disk latency never reaches the acquisition loop.
pub trait SampleSink: Send {
    fn record(&mut self, sample: &Sample) -> Result<(), PersistError>;

    fn flush(&mut self) -> Result<(), PersistError> {
        Ok(())
    }
}

/// Appends one JSON object per sample to a `.jsonl` file
pub struct JsonLinesSampleSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl JsonLinesSampleSink {
    /// Opens `path` for appending, creating parent directories
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Raw samples: {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl SampleSink for JsonLinesSampleSink {
    fn record(&mut self, sample: &Sample) -> Result<(), PersistError> {
        serde_json::to_writer(&mut self.writer, sample)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PersistError> {
        self.writer.flush()?;
        debug!("Flushed {} samples to {}", self.written, self.path.display());
        Ok(())
    }
}
