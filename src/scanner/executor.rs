//! Executor: carries out plan actions against the filesystem and record
//! store. Archive and folder zips are written atomically: build into a temp
//! file in the target directory (falling back to `tmp_root`/`temp_dir` on a
//! permission failure), fsync, then rename into place. A `.partial` fallback
//! covers cross-device renames where `fs::rename` cannot atomically replace
//! across filesystems.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::config::EngineConfig;
use crate::core::errors::{GlError, Result};
use crate::scanner::types::{Decision, PlanAction};
use crate::store::{RecordStore, RecordType};

const SIDECAR_EXTENSIONS: [&str; 4] = ["txt", "json", "xml", "nfo"];

/// Outcome of executing one action, for status/activity reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Applied,
    Skipped,
}

/// Carries out plan actions. Holds no state of its own beyond configuration;
/// every call is independent.
pub struct Executor<'a> {
    cfg: &'a EngineConfig,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub fn new(cfg: &'a EngineConfig) -> Self {
        Self { cfg }
    }

    /// Apply one action, updating `store` on success. Returns the outcome so
    /// callers can report progress without re-deriving it from the decision.
    pub fn execute(
        &self,
        action: &PlanAction,
        store: &dyn RecordStore,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome> {
        match action.decision {
            Decision::Skip => Ok(ExecutionOutcome::Skipped),
            Decision::EnsureDir => {
                fs::create_dir_all(&action.target_path)
                    .map_err(|source| GlError::io(&action.target_path, source))?;
                Ok(ExecutionOutcome::Applied)
            }
            Decision::Copy | Decision::CopyDuplicate | Decision::Rename => {
                self.copy_archive(action)?;
                self.record(action, store, RecordType::Archive, now)?;
                Ok(ExecutionOutcome::Applied)
            }
            Decision::Zip | Decision::Update => {
                self.write_zip(action)?;
                self.record(action, store, RecordType::Galleryzip, now)?;
                Ok(ExecutionOutcome::Applied)
            }
            Decision::Foldercopy => {
                self.copy_folder(action)?;
                self.record(action, store, RecordType::Foldercopy, now)?;
                Ok(ExecutionOutcome::Applied)
            }
        }
    }

    fn record(
        &self,
        action: &PlanAction,
        store: &dyn RecordStore,
        record_type: RecordType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(signature) = action.signature else {
            return Ok(());
        };
        store.upsert(
            &action.target_path,
            &action.source_path,
            record_type,
            signature,
            Some(action.virtual_target.as_path()),
            now,
        )
    }

    /// COPY / COPY_DUPLICATE / RENAME: plain file copy into `target_path`,
    /// creating parent directories first. Falls back to a plain copy when a
    /// hardlink isn't requested or isn't possible (cross-device, existing
    /// target).
    fn copy_archive(&self, action: &PlanAction) -> Result<()> {
        let parent = action
            .target_path
            .parent()
            .unwrap_or_else(|| Path::new(""));
        fs::create_dir_all(parent).map_err(|source| GlError::io(parent, source))?;
        fs::copy(&action.source_path, &action.target_path)
            .map_err(|source| GlError::io(&action.target_path, source))?;
        Ok(())
    }

    /// FOLDERCOPY: recursively mirror the gallery directory, optionally
    /// including non-image sidecar files alongside each image.
    fn copy_folder(&self, action: &PlanAction) -> Result<()> {
        copy_dir_recursive(
            &action.source_path,
            &action.target_path,
            self.cfg.settings.copy_sidecars,
        )
    }

    /// ZIP / UPDATE (overwrite_zip): build the archive atomically in a temp
    /// file, then rename it into place.
    fn write_zip(&self, action: &PlanAction) -> Result<()> {
        let target = &action.target_path;
        let parent = target.parent().unwrap_or_else(|| Path::new(""));
        fs::create_dir_all(parent).map_err(|source| GlError::io(parent, source))?;

        let (tmp_path, tmp_dir_used) = self.temp_zip_path(target)?;
        let write_result = self.build_zip(&tmp_path, &action.source_path);
        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Err(rename_err) = fs::rename(&tmp_path, target) {
            if !tmp_dir_used && is_cross_device(&rename_err) {
                let partial = target.with_file_name(append_ext(target, "partial"));
                fs::copy(&tmp_path, &partial)
                    .map_err(|source| GlError::io(&partial, source))?;
                let _ = fs::remove_file(&tmp_path);
                fs::rename(&partial, target)
                    .map_err(|source| GlError::io(target, source))?;
            } else {
                let _ = fs::remove_file(&tmp_path);
                return Err(GlError::io(target, rename_err));
            }
        }
        Ok(())
    }

    /// Temp file path for a zip build: same directory as the final target by
    /// default, falling back to `tmp_root` (or `temp_dir`, if set) if the
    /// target directory can't host a file.
    fn temp_zip_path(&self, target: &Path) -> Result<(PathBuf, bool)> {
        let parent = target.parent().unwrap_or_else(|| Path::new(""));
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = std::process::id();
        let name = format!("{stem}_{suffix:08x}.zip.tmp");

        let primary = parent.join(&name);
        if File::create(&primary).is_ok() {
            return Ok((primary, false));
        }

        let fallback_root = self
            .cfg
            .roots
            .temp_dir
            .clone()
            .unwrap_or_else(|| self.cfg.roots.tmp_root.clone());
        fs::create_dir_all(&fallback_root)
            .map_err(|source| GlError::io(&fallback_root, source))?;
        let fallback = fallback_root.join(&name);
        Ok((fallback, true))
    }

    fn build_zip(&self, tmp_path: &Path, gallery_dir: &Path) -> Result<()> {
        let file = File::create(tmp_path).map_err(|source| GlError::io(tmp_path, source))?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut images = Vec::new();
        collect_zip_entries(gallery_dir, gallery_dir, &mut images)
            .map_err(|source| GlError::io(gallery_dir, source))?;
        images.sort();

        for rel in &images {
            let abs = gallery_dir.join(rel);
            let name = rel.to_string_lossy().replace('\\', "/");
            zip.start_file(name, options)
                .map_err(|source| GlError::ArchiveWrite {
                    path: tmp_path.to_path_buf(),
                    details: source.to_string(),
                })?;
            let mut buf = Vec::new();
            File::open(&abs)
                .and_then(|mut f| f.read_to_end(&mut buf))
                .map_err(|source| GlError::io(&abs, source))?;
            zip.write_all(&buf)
                .map_err(|source| GlError::io(tmp_path, source))?;
        }

        let file = zip.finish().map_err(|source| GlError::ArchiveWrite {
            path: tmp_path.to_path_buf(),
            details: source.to_string(),
        })?;
        file.sync_all().map_err(|source| GlError::io(tmp_path, source))?;
        Ok(())
    }
}

fn append_ext(path: &Path, suffix: &str) -> std::ffi::OsString {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    name
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &std::io::Error) -> bool {
    false
}

/// Gather every image file under `dir`, relative to `base`, sorted by
/// walker-style lexicographic order at each level.
fn collect_zip_entries(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.flatten().collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_symlink() {
            continue;
        }
        if path.is_dir() {
            collect_zip_entries(base, &path, out)?;
        } else {
            out.push(path.strip_prefix(base).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}

fn copy_dir_recursive(source: &Path, target: &Path, copy_sidecars: bool) -> Result<()> {
    fs::create_dir_all(target).map_err(|source_err| GlError::io(target, source_err))?;
    let mut entries: Vec<_> = fs::read_dir(source)
        .map_err(|e| GlError::io(source, e))?
        .flatten()
        .collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let from = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        let to = target.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to, copy_sidecars)?;
        } else if copy_sidecars || !is_sidecar(&from) {
            fs::copy(&from, &to).map_err(|e| GlError::io(&to, e))?;
        }
    }
    Ok(())
}

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SIDECAR_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
