//! Planner: walks enabled sources and produces an ordered, deterministic
//! stream of plan actions against the current record store.

#![allow(missing_docs)]

use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::core::config::{EngineConfig, ScanMode, Source};
use crate::core::errors::Result;
use crate::scanner::classifier::{Classification, classify, container_directories};
use crate::scanner::exclusion::ExclusionIndex;
use crate::scanner::resolver::{OutputPathResolver, preview_virtual};
use crate::scanner::signature::{archive_signature, gallery_signature};
use crate::scanner::types::{
    ActionKind, Decision, ItemType, PlanAction, ReasonCode, ScanResult, ScanSummary, Signature,
};
use crate::scanner::walker::{DirRollup, DirectoryWalker, WalkerConfig};
use crate::store::RecordStore;

/// Produces a `ScanResult` for one configuration snapshot. A fresh
/// `Planner` must be created per scan: `flatten_name_map` state inside the
/// resolver is scan-local and must never be reused across scans.
pub struct Planner {
    duplicates_warned: Cell<bool>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            duplicates_warned: Cell::new(false),
        }
    }

    /// Plan every enabled source in `cfg`, in sorted-by-path order.
    pub fn plan(
        &self,
        cfg: &EngineConfig,
        store: &dyn RecordStore,
        now: DateTime<Utc>,
    ) -> Result<ScanResult> {
        let mut actions = Vec::new();
        let mut summary = ScanSummary::default();
        let mut warnings = Vec::new();
        let mut resolver = OutputPathResolver::new();
        let exclusions = ExclusionIndex::new(cfg.exclusions.clone());
        let walker_config = WalkerConfig {
            image_extensions: cfg.settings.image_extensions.clone(),
            archive_extensions: cfg.settings.archive_extensions.clone(),
        };
        let walker = DirectoryWalker::new(&walker_config);

        let mut sources: Vec<&Source> = cfg.sources.iter().filter(|s| s.enabled).collect();
        sources.sort_by(|a, b| a.path.cmp(&b.path));

        for source in sources {
            let source_root = cfg.roots.data_root.join(&source.path);
            if !source_root.is_dir() {
                warnings.push(format!(
                    "source {} missing at {}",
                    source.id,
                    source_root.display()
                ));
                continue;
            }

            if source.scan_mode != ScanMode::FoldersOnly {
                self.plan_archives(
                    cfg,
                    &source_root,
                    &walker,
                    store,
                    &exclusions,
                    &mut resolver,
                    now,
                    &mut actions,
                    &mut summary,
                    &mut warnings,
                )?;
            }

            let galleries_enabled =
                cfg.settings.zip_galleries || cfg.settings.output_mode.wants_foldercopy();
            if source.scan_mode != ScanMode::ArchivesOnly && galleries_enabled {
                self.plan_galleries(
                    cfg,
                    &source_root,
                    &walker,
                    store,
                    &exclusions,
                    &mut resolver,
                    now,
                    &mut actions,
                    &mut summary,
                    &mut warnings,
                )?;
            }
        }

        Ok(ScanResult {
            summary,
            actions,
            warnings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_archives(
        &self,
        cfg: &EngineConfig,
        source_root: &Path,
        walker: &DirectoryWalker<'_>,
        store: &dyn RecordStore,
        exclusions: &ExclusionIndex,
        resolver: &mut OutputPathResolver,
        now: DateTime<Utc>,
        actions: &mut Vec<PlanAction>,
        summary: &mut ScanSummary,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        for entry in walker.walk_archives(source_root) {
            let rel_path = entry.rel_path;
            if exclusions.is_excluded(&rel_path) {
                continue;
            }
            let abs_path = source_root.join(&rel_path);
            let signature = match archive_signature(&abs_path) {
                Ok(sig) => sig,
                Err(_) => {
                    warnings.push(format!("unreadable archive stat at {}", abs_path.display()));
                    continue;
                }
            };
            let Signature::Archive { size, .. } = signature else {
                unreachable!("archive_signature always returns Signature::Archive")
            };

            let (physical, virtual_target) = resolver.resolve(
                &cfg.roots.output_root,
                &rel_path,
                cfg.settings.replicate_nesting,
                cfg.settings.lanraragi_flatten,
            );
            let record = store.get(&physical).unwrap_or(None);
            let exists = physical.exists();

            let (decision, reason, target_path) = if !exists {
                (Decision::Copy, None, physical.clone())
            } else if record
                .as_ref()
                .is_some_and(|r| Signature::signatures_equal(&r.signature, &signature))
            {
                (
                    Decision::Skip,
                    Some(ReasonCode::SkipExistingUnchanged),
                    physical.clone(),
                )
            } else if stat_size_equal(&physical, size) {
                (
                    Decision::Skip,
                    Some(ReasonCode::SkipDuplicateSameSize),
                    physical.clone(),
                )
            } else {
                self.conflict_decision(cfg, &rel_path, &physical, now, warnings)
            };

            if decision == Decision::Skip {
                let _ = store.touch(&physical, now);
            }

            let action = PlanAction {
                action: ActionKind::CopyArchive,
                item_type: ItemType::Archive,
                decision,
                reason_code: reason,
                source_path: abs_path,
                target_path,
                virtual_target,
                relative_source: rel_path,
                signature: Some(signature),
                similarity: None,
                bytes: Some(size),
            };
            summary.record(&action);
            actions.push(action);
        }
        Ok(())
    }

    fn conflict_decision(
        &self,
        cfg: &EngineConfig,
        rel_path: &Path,
        physical: &Path,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> (Decision, Option<ReasonCode>, PathBuf) {
        if cfg.settings.duplicates_enabled && self.duplicates_root_available(cfg, warnings) {
            let target = cfg.roots.duplicates_root.join(rel_path);
            (Decision::CopyDuplicate, Some(ReasonCode::SkipOutputConflict), target)
        } else {
            let target = dup_rename_target(physical, now);
            (Decision::Rename, Some(ReasonCode::SkipOutputConflict), target)
        }
    }

    fn duplicates_root_available(&self, cfg: &EngineConfig, warnings: &mut Vec<String>) -> bool {
        let available = std::fs::create_dir_all(&cfg.roots.duplicates_root).is_ok();
        if !available && !self.duplicates_warned.replace(true) {
            warnings.push(format!(
                "duplicates root unavailable at {}, falling back to rename",
                cfg.roots.duplicates_root.display()
            ));
        }
        available
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_galleries(
        &self,
        cfg: &EngineConfig,
        source_root: &Path,
        walker: &DirectoryWalker<'_>,
        store: &dyn RecordStore,
        exclusions: &ExclusionIndex,
        resolver: &mut OutputPathResolver,
        now: DateTime<Utc>,
        actions: &mut Vec<PlanAction>,
        summary: &mut ScanSummary,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let rollups = walker.walk_rollups(source_root);
        let classified = classify(&rollups, &cfg.settings);

        let gallery_dirs: Vec<PathBuf> = classified
            .iter()
            .filter(|(_, c)| *c == Classification::Gallery)
            .map(|(r, _)| r.rel_dir.clone())
            .collect();
        let containers = container_directories(&rollups, &gallery_dirs);

        for (rollup, classification) in &classified {
            if exclusions.is_excluded(&rollup.rel_dir) {
                continue;
            }
            if !matches!(
                classification,
                Classification::SkipNoImages | Classification::SkipBelowMin
            ) {
                continue;
            }
            let virt = preview_virtual(
                &cfg.roots.output_root,
                &rollup.rel_dir,
                cfg.settings.replicate_nesting,
            );
            let action = PlanAction {
                action: ActionKind::ScanGallery,
                item_type: ItemType::Gallery,
                decision: Decision::Skip,
                reason_code: classification.reason_code(),
                source_path: source_root.join(&rollup.rel_dir),
                target_path: virt.clone(),
                virtual_target: virt,
                relative_source: rollup.rel_dir.clone(),
                signature: None,
                similarity: None,
                bytes: None,
            };
            summary.record(&action);
            actions.push(action);
        }

        let ensure_dirs_wanted = (cfg.settings.replicate_nesting && !cfg.settings.lanraragi_flatten)
            || cfg.settings.output_mode.wants_foldercopy();
        if ensure_dirs_wanted {
            let mut sorted_containers: Vec<PathBuf> = containers
                .into_iter()
                .filter(|c| !exclusions.is_excluded(c))
                .collect();
            sorted_containers.sort();
            for rel_dir in sorted_containers {
                let virt = preview_virtual(
                    &cfg.roots.output_root,
                    &rel_dir,
                    cfg.settings.replicate_nesting,
                );
                let action = PlanAction {
                    action: ActionKind::EnsureOutputDir,
                    item_type: ItemType::Container,
                    decision: Decision::EnsureDir,
                    reason_code: None,
                    source_path: source_root.join(&rel_dir),
                    target_path: virt.clone(),
                    virtual_target: virt,
                    relative_source: rel_dir,
                    signature: None,
                    similarity: None,
                    bytes: None,
                };
                summary.record(&action);
                actions.push(action);
            }
        }

        for (rollup, classification) in &classified {
            if *classification != Classification::Gallery || exclusions.is_excluded(&rollup.rel_dir) {
                continue;
            }
            self.plan_one_gallery(
                cfg, source_root, walker, store, resolver, now, rollup, actions, summary, warnings,
            )?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_one_gallery(
        &self,
        cfg: &EngineConfig,
        source_root: &Path,
        walker: &DirectoryWalker<'_>,
        store: &dyn RecordStore,
        resolver: &mut OutputPathResolver,
        now: DateTime<Utc>,
        rollup: &DirRollup,
        actions: &mut Vec<PlanAction>,
        summary: &mut ScanSummary,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let abs_dir = source_root.join(&rollup.rel_dir);
        let rel_images = walker.walk_gallery_images(&abs_dir, cfg.settings.consider_images_in_subfolders);

        if rel_images.is_empty() {
            let virt = preview_virtual(
                &cfg.roots.output_root,
                &rollup.rel_dir,
                cfg.settings.replicate_nesting,
            );
            let action = PlanAction {
                action: ActionKind::ScanGallery,
                item_type: ItemType::Gallery,
                decision: Decision::Skip,
                reason_code: Some(ReasonCode::SkipNoImages),
                source_path: abs_dir,
                target_path: virt.clone(),
                virtual_target: virt,
                relative_source: rollup.rel_dir.clone(),
                signature: None,
                similarity: None,
                bytes: None,
            };
            summary.record(&action);
            actions.push(action);
            return Ok(());
        }

        let abs_images: Vec<PathBuf> = rel_images.iter().map(|p| abs_dir.join(p)).collect();
        let signature = gallery_signature(&abs_images);
        let bytes = match signature {
            Signature::Gallery { total_image_bytes, .. } => Some(total_image_bytes),
            Signature::Archive { .. } => None,
        };
        let similarity = Some(basename_similarity(
            &rollup
                .rel_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            &rollup
                .rel_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ));

        if cfg.settings.zip_galleries && cfg.settings.output_mode.wants_zip() {
            let ext = cfg.settings.archive_extension_for_galleries.as_str();
            let name = rollup
                .rel_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let zip_rel = match rollup.rel_dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.join(format!("{name}.{ext}"))
                }
                _ => PathBuf::from(format!("{name}.{ext}")),
            };
            let (physical, virtual_target) = resolver.resolve(
                &cfg.roots.output_root,
                &zip_rel,
                cfg.settings.replicate_nesting,
                cfg.settings.lanraragi_flatten,
            );
            let record = store.get(&physical).unwrap_or(None);
            let exists = physical.exists();

            let (action_kind, decision, reason, target_path) = if !exists {
                (ActionKind::ZipGallery, Decision::Zip, None, physical.clone())
            } else if record
                .as_ref()
                .is_some_and(|r| Signature::signatures_equal(&r.signature, &signature))
            {
                (
                    ActionKind::ZipGallery,
                    Decision::Skip,
                    Some(ReasonCode::SkipDuplicateSameSignature),
                    physical.clone(),
                )
            } else if cfg.settings.update_gallery_zips {
                (
                    ActionKind::OverwriteZip,
                    Decision::Update,
                    None,
                    physical.clone(),
                )
            } else if cfg.settings.duplicates_enabled
                && self.duplicates_root_available(cfg, warnings)
            {
                let target = cfg
                    .roots
                    .duplicates_root
                    .join(&rollup.rel_dir)
                    .with_file_name(format!("{name}.{ext}"));
                (
                    ActionKind::ZipGallery,
                    Decision::CopyDuplicate,
                    Some(ReasonCode::SkipOutputConflict),
                    target,
                )
            } else {
                (
                    ActionKind::ZipGallery,
                    Decision::Rename,
                    Some(ReasonCode::SkipOutputConflict),
                    dup_rename_target(&physical, now),
                )
            };

            if decision == Decision::Skip {
                let _ = store.touch(&physical, now);
            }

            let action = PlanAction {
                action: action_kind,
                item_type: ItemType::Gallery,
                decision,
                reason_code: reason,
                source_path: abs_dir.clone(),
                target_path,
                virtual_target,
                relative_source: rollup.rel_dir.clone(),
                signature: Some(signature),
                similarity,
                bytes,
            };
            summary.record(&action);
            actions.push(action);
        }

        if cfg.settings.output_mode.wants_foldercopy() {
            let (physical, virtual_target) = resolver.resolve(
                &cfg.roots.output_root,
                &rollup.rel_dir,
                cfg.settings.replicate_nesting,
                cfg.settings.lanraragi_flatten,
            );
            let record = store.get(&physical).unwrap_or(None);
            let exists = physical.is_dir();

            let (decision, reason) = if exists
                && record
                    .as_ref()
                    .is_some_and(|r| Signature::signatures_equal(&r.signature, &signature))
            {
                (Decision::Skip, Some(ReasonCode::SkipDuplicateSameSignature))
            } else if exists && !cfg.settings.update_gallery_zips {
                (Decision::Skip, Some(ReasonCode::SkipOutputConflict))
            } else {
                (Decision::Foldercopy, None)
            };

            if decision == Decision::Skip && reason == Some(ReasonCode::SkipDuplicateSameSignature) {
                let _ = store.touch(&physical, now);
            }

            let action = PlanAction {
                action: ActionKind::FoldercopyGallery,
                item_type: ItemType::Gallery,
                decision,
                reason_code: reason,
                source_path: abs_dir,
                target_path: physical,
                virtual_target,
                relative_source: rollup.rel_dir.clone(),
                signature: Some(signature),
                similarity,
                bytes,
            };
            summary.record(&action);
            actions.push(action);
        }

        Ok(())
    }
}

fn stat_size_equal(path: &Path, size: u64) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.len() == size)
}

fn dup_rename_target(physical: &Path, now: DateTime<Utc>) -> PathBuf {
    let parent = physical.parent().unwrap_or_else(|| Path::new(""));
    let stem = physical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = physical.extension().map(|s| s.to_string_lossy().into_owned());
    let name = match ext {
        Some(ext) if !ext.is_empty() => format!("{stem}_DUP_{}.{ext}", now.timestamp()),
        _ => format!("{stem}_DUP_{}", now.timestamp()),
    };
    parent.join(name)
}

/// Crude 0..1 similarity between two basenames, via normalized Levenshtein
/// distance. Informational only; never drives a decision.
fn basename_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    let max_len = a.chars().count().max(b.chars().count()).max(1);
    1.0 - (distance as f64 / max_len as f64)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{EngineConfig, OutputMode, RootsConfig, ScanMode, Settings, Source};
    use crate::store::memory::InMemoryRecordStore;
    use std::fs::{self, File};

    fn base_config(root: &Path) -> EngineConfig {
        EngineConfig {
            roots: RootsConfig {
                data_root: root.join("data"),
                output_root: root.join("output"),
                config_root: root.join("config"),
                duplicates_root: root.join("duplicates"),
                tmp_root: root.join("tmp"),
                temp_dir: None,
                allowed_browse_roots: Vec::new(),
            },
            settings: Settings::default(),
            sources: vec![Source {
                id: "lib".to_string(),
                name: "Library".to_string(),
                path: "Library".into(),
                enabled: true,
                scan_mode: ScanMode::Both,
            }],
            exclusions: Vec::new(),
        }
    }

    fn make_gallery(cfg: &EngineConfig, rel: &str, files: &[&str]) {
        let dir = cfg.roots.data_root.join("Library").join(rel);
        fs::create_dir_all(&dir).unwrap();
        for f in files {
            File::create(dir.join(f)).unwrap();
        }
    }

    #[test]
    fn first_scan_zips_a_qualifying_gallery() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        make_gallery(&cfg, "SeriesA/Arc1/Chapter1", &["img1.jpg", "img2.jpg", "img3.jpg"]);

        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let result = planner.plan(&cfg, &store, Utc::now()).unwrap();

        let zip_actions: Vec<_> = result
            .actions
            .iter()
            .filter(|a| a.decision == Decision::Zip)
            .collect();
        assert_eq!(zip_actions.len(), 1);
        assert_eq!(
            zip_actions[0].target_path,
            cfg.roots
                .output_root
                .join("Library/SeriesA/Arc1/Chapter1.zip")
        );
        assert_eq!(result.summary.galleries_to_zip, 1);
    }

    #[test]
    fn second_scan_with_matching_record_skips_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        make_gallery(&cfg, "SeriesA", &["a.jpg"]);

        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let now = Utc::now();
        let first = planner.plan(&cfg, &store, now).unwrap();
        let zip_action = first
            .actions
            .iter()
            .find(|a| a.decision == Decision::Zip)
            .unwrap();
        store
            .upsert(
                &zip_action.target_path,
                &zip_action.source_path,
                crate::store::RecordType::Galleryzip,
                zip_action.signature.unwrap(),
                Some(zip_action.virtual_target.as_path()),
                now,
            )
            .unwrap();

        let planner2 = Planner::new();
        let second = planner2.plan(&cfg, &store, now).unwrap();
        let gallery_actions: Vec<_> = second
            .actions
            .iter()
            .filter(|a| a.item_type == ItemType::Gallery)
            .collect();
        assert!(
            gallery_actions
                .iter()
                .all(|a| a.decision == Decision::Skip)
        );
        assert_eq!(second.summary.planned, 0);
    }

    #[test]
    fn exclusion_removes_matching_actions() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = base_config(tmp.path());
        cfg.exclusions = vec![crate::core::config::Exclusion(PathBuf::from("SeriesA"))];
        make_gallery(&cfg, "SeriesA/Chapter1", &["a.jpg"]);
        make_gallery(&cfg, "SeriesB/Chapter1", &["b.jpg"]);

        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let result = planner.plan(&cfg, &store, Utc::now()).unwrap();

        assert!(
            result
                .actions
                .iter()
                .all(|a| !a.relative_source.starts_with("SeriesA"))
        );
        assert!(
            result
                .actions
                .iter()
                .any(|a| a.relative_source.starts_with("SeriesB"))
        );
    }

    #[test]
    fn empty_gallery_directory_emits_skip_no_images() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        fs::create_dir_all(cfg.roots.data_root.join("Library/Empty")).unwrap();

        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let result = planner.plan(&cfg, &store, Utc::now()).unwrap();

        assert!(result.actions.iter().any(|a| a.reason_code == Some(ReasonCode::SkipNoImages)));
    }

    #[test]
    fn missing_source_is_tolerated_with_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        // Library/ deliberately not created.
        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let result = planner.plan(&cfg, &store, Utc::now()).unwrap();
        assert!(result.actions.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn output_mode_zip_and_foldercopy_emits_two_actions_per_gallery() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = base_config(tmp.path());
        cfg.settings.output_mode = OutputMode::ZipAndFoldercopy;
        make_gallery(&cfg, "SeriesA", &["a.jpg"]);

        let store = InMemoryRecordStore::new();
        let planner = Planner::new();
        let result = planner.plan(&cfg, &store, Utc::now()).unwrap();

        let gallery_actions: Vec<_> = result
            .actions
            .iter()
            .filter(|a| a.item_type == ItemType::Gallery && a.decision != Decision::Skip)
            .collect();
        assert_eq!(gallery_actions.len(), 2);
    }
}
