//! JSONL scan log — append-only record of scan outcomes.
//!
//! Features:
//! - Append-only JSONL format for easy parsing
//! - Automatic rotation when the file exceeds `MAX_LOG_SIZE` (20MB)
//! - Rotated files named `.1`, `.2`, etc. (max 3 rotations)
//!
//! This is an operational log fed from the event bus, not a queryable scan
//! history.

use crate::events::{EventBus, ScanEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum scan log size before rotation (20 MB).
const MAX_LOG_SIZE: u64 = 20 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 3;

/// A single scan log line.
#[derive(Debug, Clone, Serialize)]
pub struct ScanLogEntry {
    pub timestamp: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Append-only JSONL scan log with automatic rotation.
pub struct ScanLog {
    file: File,
    path: PathBuf,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl ScanLog {
    /// Open or create the scan log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open scan log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
        })
    }

    /// Open the default scan log at `~/.axscan/scans.jsonl`.
    pub fn default_log() -> Result<Self> {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".axscan")
            .join("scans.jsonl");
        Self::open(&path)
    }

    /// Append one entry.
    pub fn log(&mut self, entry: &ScanLogEntry) -> Result<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(entry)?;
        let bytes_written = writeln!(self.file, "{json}")
            .map(|()| json.len() as u64 + 1)
            .unwrap_or(0);
        self.current_size += bytes_written;
        Ok(())
    }

    /// Rotate log files: scans.jsonl → scans.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let first_rotation = rotation_path(&self.path, 1);
        let _ = std::fs::rename(&self.path, &first_rotation);

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen scan log after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated log file: `scans.jsonl.1`, `scans.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("scans.jsonl")
    );
    base.with_file_name(name)
}

/// The log line for a bus event, if that event is loggable.
pub fn entry_for(event: &ScanEvent) -> Option<ScanLogEntry> {
    match event {
        ScanEvent::ScanCompleted {
            url,
            violation_count,
            elapsed_ms,
            ..
        } => Some(ScanLogEntry {
            timestamp: crate::events::now_timestamp(),
            outcome: "completed".to_string(),
            url: Some(url.clone()),
            violation_count: Some(*violation_count),
            elapsed_ms: Some(*elapsed_ms),
        }),
        ScanEvent::ScanFailed {
            url,
            error_kind,
            elapsed_ms,
        } => Some(ScanLogEntry {
            timestamp: crate::events::now_timestamp(),
            outcome: format!("failed:{error_kind}"),
            url: Some(url.clone()),
            violation_count: None,
            elapsed_ms: Some(*elapsed_ms),
        }),
        ScanEvent::ScanRejected { reason, .. } => Some(ScanLogEntry {
            timestamp: crate::events::now_timestamp(),
            outcome: format!("rejected:{reason}"),
            url: None,
            violation_count: None,
            elapsed_ms: None,
        }),
        ScanEvent::ScanStarted { .. } | ScanEvent::RuntimeStarted { .. } => None,
    }
}

/// Subscribe to the bus and append loggable events until the bus closes.
pub fn spawn_writer(bus: &EventBus, mut log: ScanLog) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(entry) = entry_for(&event) {
                        if let Err(e) = log.log(&entry) {
                            warn!("scan log write failed: {e}");
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "scan log fell behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
