// Copyright 2026 axscan Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan event bus — typed events from the orchestrator.
//!
//! The bus is a `tokio::sync::broadcast` channel carrying [`ScanEvent`]
//! values. Any consumer — the SSE endpoint, the JSONL scan log, tests —
//! subscribes independently. When no subscribers exist, events are silently
//! dropped (zero overhead), so emission can never block or fail a scan.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the scan service emits. Serialized to JSON for SSE and the
/// scan log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// A scan was admitted and a browser session is being launched.
    ScanStarted {
        url: String,
        caller: String,
        timestamp: String,
    },
    /// A scan finished with a normalized result.
    ScanCompleted {
        url: String,
        violation_count: usize,
        pass_count: usize,
        incomplete_count: usize,
        inapplicable_count: usize,
        elapsed_ms: u64,
    },
    /// A scan failed after admission; the session was still released.
    ScanFailed {
        url: String,
        error_kind: String,
        elapsed_ms: u64,
    },
    /// A request was turned away before any resource was allocated.
    ScanRejected { caller: String, reason: String },
    /// The service started.
    RuntimeStarted { version: String, port: u16 },
}

/// The central event bus.
///
/// Cloning shares the underlying channel; all clones reach the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: ScanEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
