//! Duplicates-acknowledgement file: `{config_root}/duplicates_ack.json`, a
//! sorted JSON array of signature-group keys an operator has accepted as
//! intentional duplicates.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{GlError, Result};

const FILE_NAME: &str = "duplicates_ack.json";

/// In-memory view of the acknowledgement file; always kept sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DuplicatesAck {
    keys: Vec<String>,
}

impl DuplicatesAck {
    /// Path of the acknowledgement file under a given `config_root`.
    #[must_use]
    pub fn path_under(config_root: &Path) -> PathBuf {
        config_root.join(FILE_NAME)
    }

    /// Load from disk, or an empty set if the file does not exist yet.
    pub fn load(config_root: &Path) -> Result<Self> {
        let path = Self::path_under(config_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|source| GlError::io(&path, source))?;
        let mut parsed: Self = serde_json::from_str(&raw)?;
        parsed.normalize();
        Ok(parsed)
    }

    /// Write to disk in canonical (sorted, deduped) form.
    pub fn save(&self, config_root: &Path) -> Result<()> {
        let mut canonical = self.clone();
        canonical.normalize();
        let path = Self::path_under(config_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GlError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(&canonical)?;
        fs::write(&path, json).map_err(|source| GlError::io(&path, source))?;
        Ok(())
    }

    /// Whether `key` has been acknowledged.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Record a key as acknowledged, keeping the backing vec sorted.
    pub fn acknowledge(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.contains(&key) {
            self.keys.push(key);
            self.keys.sort_unstable();
        }
    }

    /// Remove a previously acknowledged key, if present.
    pub fn revoke(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
    }

    fn normalize(&mut self) {
        self.keys.sort_unstable();
        self.keys.dedup();
    }
}
