//! Dual-write activity sink: writes to both SQLite and JSONL with graceful degradation.
//!
//! Architecture: a dedicated logger thread owns the `SqliteLogger` and `JsonlWriter`.
//! All other threads send `ActivityEvent` via a bounded crossbeam channel. Non-blocking
//! `try_send()` ensures the calling thread is never blocked by logging back-pressure.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{GlError, Result};
use crate::logger::jsonl::{ActivityEntry, JsonlConfig, JsonlWriter, Level};
#[cfg(feature = "sqlite")]
use crate::logger::sqlite::{ActivityRow, SqliteLogger};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events that can be logged through the dual-write coordinator.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    /// A single activity-sink write: level, message, and an optional
    /// structured payload (commonly a `PlanAction` plus `job_id`).
    Log {
        level: Level,
        message: String,
        payload: Option<serde_json::Value>,
        job_id: Option<String>,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

impl ActivityEvent {
    #[must_use]
    pub fn log(level: Level, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
            payload: None,
            job_id: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        if let Self::Log { payload: p, .. } = &mut self {
            *p = Some(payload);
        }
        self
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        if let Self::Log { job_id: j, .. } = &mut self {
            *j = Some(job_id.into());
        }
        self
    }
}

/// Thread-safe, cheaply-cloneable handle for sending activity events.
///
/// Internally wraps a bounded crossbeam `Sender`. The `send()` method uses
/// `try_send()` so callers are never blocked by logging back-pressure.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown and wait for the logger thread to finish.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for building the dual-write logger.
pub struct DualLoggerConfig {
    /// Path to the SQLite database. `None` disables SQLite.
    pub sqlite_path: Option<PathBuf>,
    /// JSONL writer config (always active).
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl Default for DualLoggerConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some(PathBuf::from(default_sqlite_path())),
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

fn default_sqlite_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.local/share/gallery-sync/activity.sqlite3")
}

/// Spawn the logger thread and return a handle.
///
/// The returned handle is `Clone + Send` and can be shared across threads.
/// The logger thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
pub fn spawn_logger(
    config: DualLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("gallery-sync-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, config.sqlite_path, config.jsonl_config, dropped_clone);
        })
        .map_err(|e| GlError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

#[allow(clippy::needless_pass_by_value)]
fn logger_thread_main(
    rx: Receiver<ActivityEvent>,
    sqlite_path: Option<PathBuf>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    #[cfg(feature = "sqlite")]
    let mut sqlite = sqlite_path.and_then(|p| match SqliteLogger::open(&p) {
        Ok(db) => Some(db),
        Err(e) => {
            eprintln!("[GL-DUAL] failed to open SQLite at {}: {e}", p.display());
            None
        }
    });
    #[cfg(not(feature = "sqlite"))]
    let _ = sqlite_path;

    let mut jsonl = JsonlWriter::open(jsonl_config);
    #[cfg(feature = "sqlite")]
    let mut sqlite_failures: u32 = 0;

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            jsonl.write_entry(&ActivityEntry::new(
                Level::Warn,
                format!("{d} activity events dropped due to back-pressure"),
            ));
        }

        if matches!(event, ActivityEvent::Shutdown) {
            jsonl.flush();
            jsonl.fsync();
            break;
        }

        let entry = event_to_entry(&event);
        jsonl.write_entry(&entry);

        #[cfg(feature = "sqlite")]
        {
            if let Some(db) = &sqlite {
                let row = entry_to_row(&entry);
                if db.log_activity(&row).is_ok() {
                    sqlite_failures = 0;
                } else {
                    sqlite_failures += 1;
                    if sqlite_failures >= 3 {
                        eprintln!(
                            "[GL-DUAL] SQLite write failed {sqlite_failures} times, disabling"
                        );
                        sqlite = None;
                    }
                }
            }
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

fn event_to_entry(event: &ActivityEvent) -> ActivityEntry {
    match event {
        ActivityEvent::Log {
            level,
            message,
            payload,
            job_id,
        } => {
            let mut entry = ActivityEntry::new(*level, message.clone());
            entry.payload_json = match (payload.clone(), job_id.clone()) {
                (Some(mut p), Some(job_id)) => {
                    if let serde_json::Value::Object(map) = &mut p {
                        map.insert("job_id".to_string(), serde_json::Value::String(job_id));
                    }
                    Some(p)
                }
                (Some(p), None) => Some(p),
                (None, Some(job_id)) => Some(serde_json::json!({ "job_id": job_id })),
                (None, None) => None,
            };
            entry
        }
        ActivityEvent::Shutdown => ActivityEntry::new(Level::Info, "shutdown"),
    }
}

#[cfg(feature = "sqlite")]
fn entry_to_row(entry: &ActivityEntry) -> ActivityRow {
    let job_id = entry
        .payload_json
        .as_ref()
        .and_then(|p| p.get("job_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let level = match entry.level {
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARN",
        Level::Error => "ERROR",
    };
    ActivityRow {
        timestamp: entry.ts.clone(),
        level: level.to_string(),
        message: entry.message.clone(),
        job_id,
        payload_json: entry
            .payload_json
            .as_ref()
            .and_then(|p| serde_json::to_string(p).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> DualLoggerConfig {
        DualLoggerConfig {
            sqlite_path: Some(dir.join("test.db")),
            jsonl_config: JsonlConfig {
                path: dir.join("test.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(ActivityEvent::log(Level::Info, "engine started"));
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(!contents.is_empty());
        assert!(contents.contains("engine started"));
    }

    #[test]
    fn multiple_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();

        handle.send(ActivityEvent::log(Level::Info, "engine started"));
        handle.send(
            ActivityEvent::log(Level::Info, "scan completed")
                .with_payload(serde_json::json!({"decision": "COPY"}))
                .with_job_id("job-1"),
        );
        handle.send(ActivityEvent::log(Level::Error, "write failed"));
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 3);

        #[cfg(feature = "sqlite")]
        {
            let db = SqliteLogger::open(&dir.path().join("test.db")).unwrap();
            let rows = db.activity_for_job("job-1", 10).unwrap();
            assert_eq!(rows.len(), 1);
        }
    }

    #[test]
    fn handles_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        let h2 = handle.clone();

        handle.send(ActivityEvent::log(Level::Info, "from handle 1"));
        h2.send(ActivityEvent::log(Level::Info, "from handle 2"));
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn sqlite_disabled_when_path_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = DualLoggerConfig {
            sqlite_path: None,
            jsonl_config: JsonlConfig {
                path: dir.path().join("no_sqlite.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        };
        let (handle, join) = spawn_logger(config).unwrap();
        handle.send(ActivityEvent::log(Level::Error, "GL-9999 test error"));
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("no_sqlite.jsonl")).unwrap();
        assert!(contents.contains("GL-9999"));
        // No crash even without SQLite.
    }

    #[test]
    fn dropped_events_counted() {
        let dir = tempfile::tempdir().unwrap();
        let config = DualLoggerConfig {
            sqlite_path: None,
            jsonl_config: JsonlConfig {
                path: dir.path().join("drop.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 2, // tiny channel
        };
        let (handle, _join) = spawn_logger(config).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
    }
}
