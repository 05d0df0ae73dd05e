//! In-memory record store, used for tests and for engine configurations
//! that run without the `sqlite` feature.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::errors::Result;
use crate::scanner::types::Signature;
use crate::store::{ArchiveRecord, RecordStore, RecordType};

/// `RecordStore` backed by a mutex-guarded `HashMap`.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<PathBuf, ArchiveRecord>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, target_path: &Path) -> Result<Option<ArchiveRecord>> {
        Ok(self.records.lock().get(target_path).cloned())
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
        let mut records = self.records.lock();
        let created_at = records
            .get(target_path)
            .map_or(now, |existing| existing.created_at);
        records.insert(
            target_path.to_path_buf(),
            ArchiveRecord {
                target_path: target_path.to_path_buf(),
                source_path: source_path.to_path_buf(),
                record_type,
                signature,
                virtual_target_path: virtual_target_path.map(Path::to_path_buf),
                created_at,
                updated_at: now,
                last_seen_at: now,
            },
        );
        Ok(())
    }

    fn touch(&self, target_path: &Path, now: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.records.lock().get_mut(target_path) {
            record.last_seen_at = now;
        }
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ArchiveRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn list_by_type(&self, types: &[RecordType]) -> Result<Vec<ArchiveRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| types.contains(&r.record_type))
            .cloned()
            .collect())
    }
}
