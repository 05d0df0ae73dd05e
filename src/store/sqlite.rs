//! SQLite-backed record store: WAL-mode table of materialized outputs.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::core::errors::{GlError, Result};
use crate::scanner::types::Signature;
use crate::store::{ArchiveRecord, RecordStore, RecordType};

/// `RecordStore` backed by a WAL-mode SQLite database.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
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
            conn: Mutex::new(conn),
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, target_path: &Path) -> Result<Option<ArchiveRecord>> {
        let conn = self.conn.lock();
        let target = target_path.to_string_lossy().into_owned();
        let row = conn
            .query_row(
                "SELECT target_path, source_path, record_type, signature_json,
                        virtual_target_path, created_at, updated_at, last_seen_at
                 FROM archive_records WHERE target_path = ?1",
                params![target],
                row_to_record,
            )
            .optional()?;
        Ok(row)
    }

    fn upsert(
        &self,
        target_path: &Path,
        source_path: &Path,
        record_type: RecordType,
        signature: Signature,
        virtual_target_path: Option<&Path>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let target = target_path.to_string_lossy().into_owned();
        let now_str = now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let existing_created_at: Option<String> = conn
            .query_row(
                "SELECT created_at FROM archive_records WHERE target_path = ?1",
                params![target],
                |row| row.get(0),
            )
            .optional()?;
        let created_at = existing_created_at.unwrap_or_else(|| now_str.clone());

        conn.execute(
            "INSERT INTO archive_records (
                target_path, source_path, record_type, signature_json,
                virtual_target_path, created_at, updated_at, last_seen_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?7)
            ON CONFLICT(target_path) DO UPDATE SET
                source_path = excluded.source_path,
                record_type = excluded.record_type,
                signature_json = excluded.signature_json,
                virtual_target_path = excluded.virtual_target_path,
                updated_at = excluded.updated_at,
                last_seen_at = excluded.updated_at",
            params![
                target,
                source_path.to_string_lossy(),
                record_type_str(record_type),
                signature.canonical_json(),
                virtual_target_path.map(|p| p.to_string_lossy().into_owned()),
                created_at,
                now_str,
            ],
        )?;
        Ok(())
    }

    fn touch(&self, target_path: &Path, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        let now_str = now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        conn.execute(
            "UPDATE archive_records SET last_seen_at = ?1 WHERE target_path = ?2",
            params![now_str, target_path.to_string_lossy()],
        )?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ArchiveRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT target_path, source_path, record_type, signature_json,
                    virtual_target_path, created_at, updated_at, last_seen_at
             FROM archive_records ORDER BY target_path",
        )?;
        let rows = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_by_type(&self, types: &[RecordType]) -> Result<Vec<ArchiveRecord>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| types.contains(&r.record_type))
            .collect())
    }
}

fn record_type_str(t: RecordType) -> &'static str {
    match t {
        RecordType::Archive => "archive",
        RecordType::Galleryzip => "galleryzip",
        RecordType::Foldercopy => "foldercopy",
    }
}

fn parse_record_type(s: &str) -> RecordType {
    match s {
        "galleryzip" => RecordType::Galleryzip,
        "foldercopy" => RecordType::Foldercopy,
        _ => RecordType::Archive,
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArchiveRecord> {
    let target_path: String = row.get(0)?;
    let source_path: String = row.get(1)?;
    let record_type: String = row.get(2)?;
    let signature_json: String = row.get(3)?;
    let virtual_target_path: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    let last_seen_at: String = row.get(7)?;

    let signature: Signature = serde_json::from_str(&signature_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ArchiveRecord {
        target_path: PathBuf::from(target_path),
        source_path: PathBuf::from(source_path),
        record_type: parse_record_type(&record_type),
        signature,
        virtual_target_path: virtual_target_path.map(PathBuf::from),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        last_seen_at: parse_ts(&last_seen_at),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS archive_records (
            target_path TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            record_type TEXT NOT NULL,
            signature_json TEXT NOT NULL,
            virtual_target_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_type ON archive_records(record_type);",
    )?;
    Ok(())
}
