//! Status reporter: mutex-protected engine state, polled by external callers.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Standby,
    Scanning,
    Error,
}

/// Snapshot of the engine's current state, as exposed to status callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: EngineState,
    pub message: Option<String>,
    pub progress: Option<f64>,
    pub meta: Value,
    pub updated_at: DateTime<Utc>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: EngineState::Standby,
            message: None,
            progress: None,
            meta: Value::Null,
            updated_at: Utc::now(),
        }
    }
}

/// Mutex-protected publisher of engine state.
///
/// Transitions: `standby -> scanning` (progress 0) at scan start, progress
/// updates per completed op, `standby` on clean finish, `error` on a
/// propagated scan failure.
pub struct StatusReporter {
    snapshot: Mutex<StatusSnapshot>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(StatusSnapshot::default()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock().clone()
    }

    /// Enter `scanning` with progress reset to 0.
    pub fn scan_started(&self, message: impl Into<String>) {
        let mut s = self.snapshot.lock();
        s.state = EngineState::Scanning;
        s.message = Some(message.into());
        s.progress = Some(0.0);
        s.updated_at = Utc::now();
    }

    /// Report progress as `completed / planned`, clamped to `[0, 1]`.
    pub fn progress(&self, completed: u64, planned: u64) {
        let mut s = self.snapshot.lock();
        s.progress = Some(if planned == 0 {
            1.0
        } else {
            (completed as f64 / planned as f64).clamp(0.0, 1.0)
        });
        s.updated_at = Utc::now();
    }

    /// Attach arbitrary structured metadata (e.g. a `ScanSummary`).
    pub fn set_meta(&self, meta: Value) {
        let mut s = self.snapshot.lock();
        s.meta = meta;
        s.updated_at = Utc::now();
    }

    /// Return to `standby` on a clean finish.
    pub fn scan_finished(&self) {
        let mut s = self.snapshot.lock();
        s.state = EngineState::Standby;
        s.message = None;
        s.progress = None;
        s.updated_at = Utc::now();
    }

    /// Enter `error` on a propagated scan failure. The error is re-raised to
    /// the worker; this only records the observable state.
    pub fn scan_failed(&self, message: impl Into<String>) {
        let mut s = self.snapshot.lock();
        s.state = EngineState::Error;
        s.message = Some(message.into());
        s.updated_at = Utc::now();
    }
}
