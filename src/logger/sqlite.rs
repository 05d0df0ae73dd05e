//! SQLite activity sink: WAL-mode database for structured activity storage and querying.
//!
//! Uses Write-Ahead Logging for concurrent read/write and prepared statements for
//! insert throughput, with graceful degradation when the disk can't be written.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{GlError, Result};

/// SQLite activity logger with WAL mode and prepared-statement patterns.
pub struct SqliteLogger {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLogger {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| GlError::io(parent, source))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a row into `activity_log`.
    pub fn log_activity(&self, row: &ActivityRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO activity_log (timestamp, level, message, job_id, payload_json)
                 VALUES (?1,?2,?3,?4,?5)",
            )?
            .execute(params![
                row.timestamp,
                row.level,
                row.message,
                row.job_id,
                row.payload_json,
            ])?;
        Ok(())
    }

    /// Query recent activity entries, newest first.
    pub fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, level, message, job_id, payload_json
             FROM activity_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ActivityRow {
                    timestamp: row.get(0)?,
                    level: row.get(1)?,
                    message: row.get(2)?,
                    job_id: row.get(3)?,
                    payload_json: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Query activity entries for a specific job, newest first.
    pub fn activity_for_job(&self, job_id: &str, limit: u32) -> Result<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, level, message, job_id, payload_json
             FROM activity_log WHERE job_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![job_id, limit], |row| {
                Ok(ActivityRow {
                    timestamp: row.get(0)?,
                    level: row.get(1)?,
                    message: row.get(2)?,
                    job_id: row.get(3)?,
                    payload_json: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete `activity_log` rows older than `retention_days`.
    pub fn prune_activity_log(&self, retention_days: u32) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let cutoff_str = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let deleted = self.conn.execute(
            "DELETE FROM activity_log WHERE timestamp < ?1",
            params![cutoff_str],
        )?;
        Ok(deleted)
    }

    /// Count activity entries of a given level since a timestamp.
    pub fn count_level_since(&self, level: &str, since: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM activity_log WHERE level = ?1 AND timestamp >= ?2",
            params![level, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

/// Row for the `activity_log` table.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub job_id: Option<String>,
    pub payload_json: Option<String>,
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA mmap_size = 67108864;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[GL-SQLITE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            level TEXT NOT NULL,
            message TEXT NOT NULL,
            job_id TEXT,
            payload_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_activity_timestamp ON activity_log(timestamp);
        CREATE INDEX IF NOT EXISTS idx_activity_level ON activity_log(level);
        CREATE INDEX IF NOT EXISTS idx_activity_job ON activity_log(job_id);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, SqliteLogger) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let logger = SqliteLogger::open(&db_path).unwrap();
        (dir, logger)
    }

    #[test]
    fn schema_created_and_wal_active() {
        let (_dir, logger) = temp_db();
        assert!(logger.is_wal_mode());
    }

    #[test]
    fn insert_and_query_activity() {
        let (_dir, logger) = temp_db();
        let row = ActivityRow {
            timestamp: "2026-07-28T16:30:00Z".to_string(),
            level: "INFO".to_string(),
            message: "copied gallery".to_string(),
            job_id: Some("job-1".to_string()),
            payload_json: Some(r#"{"decision":"COPY"}"#.to_string()),
        };
        logger.log_activity(&row).unwrap();

        let results = logger.recent_activity(10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "copied gallery");
        assert_eq!(results[0].job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn activity_for_job_filters_by_job_id() {
        let (_dir, logger) = temp_db();
        for (job_id, msg) in [("job-1", "a"), ("job-2", "b"), ("job-1", "c")] {
            logger
                .log_activity(&ActivityRow {
                    timestamp: "2026-07-28T16:30:00Z".to_string(),
                    level: "INFO".to_string(),
                    message: msg.to_string(),
                    job_id: Some(job_id.to_string()),
                    payload_json: None,
                })
                .unwrap();
        }

        let results = logger.activity_for_job("job-1", 10).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn prune_removes_old_rows() {
        let (_dir, logger) = temp_db();
        logger
            .log_activity(&ActivityRow {
                timestamp: "2000-01-01T00:00:00Z".to_string(),
                level: "INFO".to_string(),
                message: "ancient".to_string(),
                job_id: None,
                payload_json: None,
            })
            .unwrap();

        let deleted = logger.prune_activity_log(30).unwrap();
        assert_eq!(deleted, 1);
        assert!(logger.recent_activity(10).unwrap().is_empty());
    }

    #[test]
    fn count_level_since_counts_matching_rows() {
        let (_dir, logger) = temp_db();
        for i in 0..5 {
            logger
                .log_activity(&ActivityRow {
                    timestamp: format!("2026-07-28T16:3{i}:00Z"),
                    level: "WARN".to_string(),
                    message: format!("warning {i}"),
                    job_id: None,
                    payload_json: None,
                })
                .unwrap();
        }
        let count = logger
            .count_level_since("WARN", "2026-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn idempotent_schema_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("idempotent.db");
        let _ = SqliteLogger::open(&db_path).unwrap();
        let logger = SqliteLogger::open(&db_path).unwrap();
        assert!(logger.is_wal_mode());
    }
}
