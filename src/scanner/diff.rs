//! Diff engine: reports new / changed / missing / unchanged outputs,
//! read-only against the walker and record store. Re-derives expected
//! physical targets exactly as the planner's resolver would, without
//! applying any of the resolver's flatten side effects.

#![allow(missing_docs)]

use std::path::PathBuf;

use crate::core::config::{EngineConfig, ScanMode, Source};
use crate::core::errors::Result;
use crate::scanner::classifier::{Classification, classify};
use crate::scanner::exclusion::ExclusionIndex;
use crate::scanner::resolver::OutputPathResolver;
use crate::scanner::signature::{archive_signature, gallery_signature};
use crate::scanner::types::Signature;
use crate::scanner::walker::{DirectoryWalker, WalkerConfig};
use crate::store::RecordStore;

/// One expected-target entry compared against the record store.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    pub target_path: PathBuf,
    pub relative_source: PathBuf,
}

/// Buckets of expected targets, relative to the current record store.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub new: Vec<DiffEntry>,
    pub unchanged: Vec<DiffEntry>,
    pub changed: Vec<DiffEntry>,
    pub missing: Vec<DiffEntry>,
}

/// Computes a `DiffReport` without touching the filesystem beyond reads.
pub struct DiffEngine;

impl DiffEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn diff(&self, cfg: &EngineConfig, store: &dyn RecordStore) -> Result<DiffReport> {
        let mut report = DiffReport::default();
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
                continue;
            }

            if source.scan_mode != ScanMode::FoldersOnly {
                for entry in walker.walk_archives(&source_root) {
                    if exclusions.is_excluded(&entry.rel_path) {
                        continue;
                    }
                    let abs_path = source_root.join(&entry.rel_path);
                    let Ok(signature) = archive_signature(&abs_path) else {
                        continue;
                    };
                    let (target, _virtual_target) = resolver.resolve(
                        &cfg.roots.output_root,
                        &entry.rel_path,
                        cfg.settings.replicate_nesting,
                        cfg.settings.lanraragi_flatten,
                    );
                    classify_entry(&target, &entry.rel_path, signature, store, &mut report)?;
                }
            }

            let galleries_enabled =
                cfg.settings.zip_galleries || cfg.settings.output_mode.wants_foldercopy();
            if source.scan_mode == ScanMode::ArchivesOnly || !galleries_enabled {
                continue;
            }

            let rollups = walker.walk_rollups(&source_root);
            let classified = classify(&rollups, &cfg.settings);
            for (rollup, classification) in &classified {
                if *classification != Classification::Gallery
                    || exclusions.is_excluded(&rollup.rel_dir)
                {
                    continue;
                }
                let abs_dir = source_root.join(&rollup.rel_dir);
                let images = walker.walk_gallery_images(
                    &abs_dir,
                    cfg.settings.consider_images_in_subfolders,
                );
                if images.is_empty() {
                    continue;
                }
                let abs_images: Vec<PathBuf> = images.iter().map(|p| abs_dir.join(p)).collect();
                let signature = gallery_signature(&abs_images);

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
                    let (target, _virtual_target) = resolver.resolve(
                        &cfg.roots.output_root,
                        &zip_rel,
                        cfg.settings.replicate_nesting,
                        cfg.settings.lanraragi_flatten,
                    );
                    classify_entry(&target, &rollup.rel_dir, signature, store, &mut report)?;
                }

                if cfg.settings.output_mode.wants_foldercopy() {
                    let (target, _virtual_target) = resolver.resolve(
                        &cfg.roots.output_root,
                        &rollup.rel_dir,
                        cfg.settings.replicate_nesting,
                        cfg.settings.lanraragi_flatten,
                    );
                    classify_entry(&target, &rollup.rel_dir, signature, store, &mut report)?;
                }
            }
        }

        for record in store.list_all()? {
            if !record.source_path.exists() {
                report.missing.push(DiffEntry {
                    target_path: record.target_path,
                    relative_source: record.source_path,
                });
            }
        }

        Ok(report)
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_entry(
    target: &std::path::Path,
    relative_source: &std::path::Path,
    signature: Signature,
    store: &dyn RecordStore,
    report: &mut DiffReport,
) -> Result<()> {
    let entry = DiffEntry {
        target_path: target.to_path_buf(),
        relative_source: relative_source.to_path_buf(),
    };
    match store.get(target)? {
        None => report.new.push(entry),
        Some(record) if Signature::signatures_equal(&record.signature, &signature) => {
            report.unchanged.push(entry);
        }
        Some(_) => report.changed.push(entry),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{RootsConfig, ScanMode, Settings, Source};
    use crate::store::memory::InMemoryRecordStore;
    use crate::store::RecordType;
    use chrono::Utc;
    use std::fs::{self, File};

    fn base_config(root: &std::path::Path) -> EngineConfig {
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

    #[test]
    fn gallery_with_no_record_is_new() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        let dir = cfg.roots.data_root.join("Library/SeriesA");
        fs::create_dir_all(&dir).unwrap();
        File::create(dir.join("a.jpg")).unwrap();

        let store = InMemoryRecordStore::new();
        let report = DiffEngine::new().diff(&cfg, &store).unwrap();
        assert_eq!(report.new.len(), 1);
        assert!(report.unchanged.is_empty());
        assert!(report.changed.is_empty());
    }

    #[test]
    fn matching_record_is_unchanged_and_stale_source_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        let dir = cfg.roots.data_root.join("Library/SeriesA");
        fs::create_dir_all(&dir).unwrap();
        File::create(dir.join("a.jpg")).unwrap();

        let target = cfg.roots.output_root.join("SeriesA.zip");
        let now = Utc::now();
        let store = InMemoryRecordStore::new();
        let sig = gallery_signature(&[dir.join("a.jpg")]);
        store
            .upsert(&target, &dir, RecordType::Galleryzip, sig, None, now)
            .unwrap();

        let report = DiffEngine::new().diff(&cfg, &store).unwrap();
        assert_eq!(report.unchanged.len(), 1);
        assert!(report.new.is_empty());

        // A record whose source_path no longer exists shows up as missing.
        let stale = cfg.roots.output_root.join("stale.zip");
        store
            .upsert(
                &stale,
                &cfg.roots.data_root.join("Library/Gone"),
                RecordType::Galleryzip,
                sig,
                None,
                now,
            )
            .unwrap();
        let report = DiffEngine::new().diff(&cfg, &store).unwrap();
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].target_path, stale);
    }

    #[test]
    fn changed_signature_is_reported_as_changed() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = base_config(tmp.path());
        let dir = cfg.roots.data_root.join("Library/SeriesA");
        fs::create_dir_all(&dir).unwrap();
        File::create(dir.join("a.jpg")).unwrap();

        let target = cfg.roots.output_root.join("SeriesA.zip");
        let now = Utc::now();
        let store = InMemoryRecordStore::new();
        let stale_sig = Signature::Gallery {
            image_count: 99,
            total_image_bytes: 99,
            newest_mtime: 99.0,
        };
        store
            .upsert(&target, &dir, RecordType::Galleryzip, stale_sig, None, now)
            .unwrap();

        let report = DiffEngine::new().diff(&cfg, &store).unwrap();
        assert_eq!(report.changed.len(), 1);
    }
}
