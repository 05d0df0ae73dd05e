//! Shared scan-domain types: signatures, plan actions, and scan summaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Content-identity fingerprint for a gallery or an archive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signature {
    /// Gallery signature: sums sizes and maxes mtimes over the image list.
    Gallery {
        image_count: u64,
        total_image_bytes: u64,
        newest_mtime: f64,
    },
    /// Archive signature: raw stat fields.
    Archive { size: u64, mtime: f64 },
}

impl Signature {
    /// Canonical sort-keyed JSON used for equality comparisons, per spec.
    ///
    /// `serde_json` serializes struct fields in declaration order already;
    /// this exists to make the "canonical serialization" comparison explicit
    /// at call sites rather than relying on `PartialEq` alone.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    #[must_use]
    pub fn signatures_equal(a: &Signature, b: &Signature) -> bool {
        a.canonical_json() == b.canonical_json()
    }
}

/// A directory (or an archive file) discovered by the walker and accepted by
/// the classifier as a publishable gallery. Lives only within one scan.
#[derive(Debug, Clone)]
pub struct GalleryCandidate {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the source root.
    pub rel_dir: PathBuf,
    /// Image files belonging to the gallery, in walker order.
    pub images: Vec<PathBuf>,
    pub signature: Signature,
    pub is_leaf: bool,
}

/// High-level action kind, mirroring the original engine's action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CopyArchive,
    ZipGallery,
    OverwriteZip,
    FoldercopyGallery,
    EnsureOutputDir,
    ScanGallery,
}

/// What the executor should actually do with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Copy,
    Zip,
    Update,
    Foldercopy,
    CopyDuplicate,
    Rename,
    EnsureDir,
    Skip,
}

/// The kind of item an action concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Archive,
    Gallery,
    Container,
}

/// Stable reason code, part of the external API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    SkipExistingUnchanged,
    SkipDuplicateSameSize,
    SkipDuplicateSameSignature,
    SkipOutputConflict,
    SkipNoImages,
    SkipBelowMinImages,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipExistingUnchanged => "SKIP_EXISTING_UNCHANGED",
            Self::SkipDuplicateSameSize => "SKIP_DUPLICATE_SAME_SIZE",
            Self::SkipDuplicateSameSignature => "SKIP_DUPLICATE_SAME_SIGNATURE",
            Self::SkipOutputConflict => "SKIP_OUTPUT_CONFLICT",
            Self::SkipNoImages => "SKIP_NO_IMAGES",
            Self::SkipBelowMinImages => "SKIP_BELOW_MIN_IMAGES",
        }
    }
}

/// A single planned (or executed) action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAction {
    pub action: ActionKind,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub virtual_target: PathBuf,
    pub relative_source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl PlanAction {
    #[must_use]
    pub fn is_skip(&self) -> bool {
        matches!(self.decision, Decision::Skip)
    }
}

/// Aggregate counters produced by a single planning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub planned: u64,
    pub skipped: u64,
    pub archives_to_copy: u64,
    pub galleries_to_zip: u64,
    pub duplicates: u64,
    pub overwrites: u64,
    pub skipped_existing: u64,
    pub reason_counts: std::collections::BTreeMap<String, u64>,
}

impl ScanSummary {
    pub fn record(&mut self, action: &PlanAction) {
        if action.is_skip() {
            self.skipped += 1;
        } else {
            self.planned += 1;
        }

        match action.decision {
            Decision::Copy => self.archives_to_copy += 1,
            Decision::Zip | Decision::Foldercopy => self.galleries_to_zip += 1,
            Decision::Update => self.overwrites += 1,
            Decision::Rename | Decision::CopyDuplicate => self.duplicates += 1,
            Decision::Skip | Decision::EnsureDir => {}
        }

        if matches!(
            action.reason_code,
            Some(
                ReasonCode::SkipExistingUnchanged
                    | ReasonCode::SkipDuplicateSameSignature
                    | ReasonCode::SkipDuplicateSameSize
            )
        ) {
            self.skipped_existing += 1;
        }

        if let Some(reason) = action.reason_code {
            *self
                .reason_counts
                .entry(reason.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
}

/// Full result of one scan: summary plus the full ordered action stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub summary: ScanSummary,
    pub actions: Vec<PlanAction>,
    /// Non-fatal warnings (missing source, unavailable duplicates root, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
