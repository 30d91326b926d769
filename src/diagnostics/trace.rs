// Decision tracing
// Append-only JSONL log of classifier decisions and emitted gestures

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gestures::{DebugRecord, GestureEvent};

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One line of the decision trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// ISO 8601 wall-clock time the entry was written
    pub timestamp: String,

    /// Decision name (e.g., "tap.arm", "flick.eval", "halt.chop") or bus topic
    pub name: String,

    /// Frame timestamp the decision was made at
    pub timestamp_ms: f64,

    /// Classifier measurements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(name: String, timestamp_ms: f64) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            name,
            timestamp_ms,
            data: None,
        }
    }

    pub fn from_record(record: &DebugRecord) -> Self {
        let data = (!record.metadata.is_empty()).then(|| serde_json::Value::Object(record.metadata.clone()));
        TraceEntry {
            data,
            ..TraceEntry::new(record.name.clone(), record.timestamp_ms)
        }
    }

    /// Entry for a published gesture, keyed by its bus topic
    pub fn from_event(event: &GestureEvent) -> Self {
        let mut data = event.metadata.clone();
        data.insert("id".to_string(), event.id.to_string().into());
        TraceEntry {
            data: Some(serde_json::Value::Object(data)),
            ..TraceEntry::new(event.topic().to_string(), event.timestamp_ms)
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Decision trace writer
/// Manages an append-only JSONL trace file
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry to the file
    /// Creates file if it doesn't exist
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    /// Write multiple entries at once
    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            let json_line = entry.to_json_line()?;
            file.write_all(json_line.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }

    /// Debug observer that appends every record it sees
    /// Write failures are logged and dropped; tracing never stops recognition
    pub fn observer(&self) -> impl FnMut(&DebugRecord) + 'static {
        let writer = self.clone();
        move |record: &DebugRecord| {
            if let Err(e) = writer.write(&TraceEntry::from_record(record)) {
                log::warn!("Failed to trace {}: {}", record.name, e);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
