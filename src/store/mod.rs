//! Record store: persistent table of materialized outputs, keyed by
//! physical target path.

#![allow(missing_docs)]

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::scanner::types::Signature;

/// Kind of materialized output a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Archive,
    Galleryzip,
    Foldercopy,
}

/// Persistent record of one materialized output.
///
/// `target_path` is the physical on-disk path actually written — this is
/// the record's identity key, not the virtual display path. When flattening
/// is active the two can differ; record identity must stay tied to the
/// physical path so two galleries sharing a virtual basename still get two
/// distinct records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub target_path: PathBuf,
    pub source_path: PathBuf,
    pub record_type: RecordType,
    pub signature: Signature,
    pub virtual_target_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Required record store operations. Callers serialize access through the
/// single scan worker; no internal locking is exposed.
pub trait RecordStore: Send + Sync {
    fn get(&self, target_path: &Path) -> Result<Option<ArchiveRecord>>;

    #[allow(clippy::too_many_arguments)]
    fn upsert(
        &self,
        target_path: &Path,
        source_path: &Path,
        record_type: RecordType,
        signature: Signature,
        virtual_target_path: Option<&Path>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    fn touch(&self, target_path: &Path, now: DateTime<Utc>) -> Result<()>;

    fn list_all(&self) -> Result<Vec<ArchiveRecord>>;

    fn list_by_type(&self, types: &[RecordType]) -> Result<Vec<ArchiveRecord>>;
}
