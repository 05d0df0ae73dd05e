//! Deterministic, sequential directory walker.
//!
//! Produces a post-order rollup of image counts for every directory under a
//! root, and (separately) a flat sorted enumeration of archive files. A scan
//! never parallelizes across directories or files — the planner's
//! determinism guarantee depends on a single, stable walk order: entries
//! within a directory are enumerated in case-sensitive lexicographic order,
//! directories are recursed in the same order, and symlinks are never
//! followed.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-directory image rollup produced by a bottom-up walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRollup {
    /// Directory path, relative to the walked root.
    pub rel_dir: PathBuf,
    /// Image files directly inside this directory, sorted by name.
    pub direct_image_files: Vec<PathBuf>,
    /// Count of image files directly inside this directory.
    pub direct_images: u64,
    /// Count of image files anywhere under this directory (inclusive).
    pub total_images: u64,
    /// True iff this directory has no child directories.
    pub is_leaf: bool,
}

/// A single archive file discovered under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path relative to the walked root.
    pub rel_path: PathBuf,
}

/// Walker configuration: which extensions count as images / archives.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub image_extensions: BTreeSet<String>,
    pub archive_extensions: BTreeSet<String>,
}

impl WalkerConfig {
    #[must_use]
    pub fn is_image(&self, path: &Path) -> bool {
        matches_extension(path, &self.image_extensions)
    }

    #[must_use]
    pub fn is_archive(&self, path: &Path) -> bool {
        matches_extension(path, &self.archive_extensions)
    }
}

fn matches_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_lowercase()))
}

/// Sequential, deterministic filesystem walker.
pub struct DirectoryWalker<'a> {
    config: &'a WalkerConfig,
}

impl<'a> DirectoryWalker<'a> {
    #[must_use]
    pub fn new(config: &'a WalkerConfig) -> Self {
        Self { config }
    }

    /// Walk `root` bottom-up (post-order), returning one rollup per directory
    /// including `root` itself. A missing root yields an empty vec, not an
    /// error.
    #[must_use]
    pub fn walk_rollups(&self, root: &Path) -> Vec<DirRollup> {
        let mut rollups = Vec::new();
        if root.is_dir() {
            self.walk_dir(root, Path::new(""), &mut rollups);
        }
        rollups
    }

    fn walk_dir(&self, abs_dir: &Path, rel_dir: &Path, out: &mut Vec<DirRollup>) -> (u64, bool) {
        let Some(entries) = sorted_entries(abs_dir) else {
            out.push(DirRollup {
                rel_dir: rel_dir.to_path_buf(),
                direct_image_files: Vec::new(),
                direct_images: 0,
                total_images: 0,
                is_leaf: true,
            });
            return (0, true);
        };

        let mut direct_image_files = Vec::new();
        let mut subdirs = Vec::new();

        for entry in &entries {
            if entry.is_dir {
                subdirs.push(entry.name.clone());
            } else if self.config.is_image(Path::new(&entry.name)) {
                direct_image_files.push(rel_dir.join(&entry.name));
            }
        }

        let direct_images = direct_image_files.len() as u64;
        let mut total_images = direct_images;
        let is_leaf = subdirs.is_empty();

        for name in &subdirs {
            let child_abs = abs_dir.join(name);
            let child_rel = rel_dir.join(name);
            let (child_total, _) = self.walk_dir(&child_abs, &child_rel, out);
            total_images += child_total;
        }

        out.push(DirRollup {
            rel_dir: rel_dir.to_path_buf(),
            direct_image_files,
            direct_images,
            total_images,
            is_leaf,
        });

        (total_images, is_leaf)
    }

    /// Enumerate archive files under `root`, sorted by full relative path
    /// string. Missing root yields an empty vec.
    #[must_use]
    pub fn walk_archives(&self, root: &Path) -> Vec<ArchiveEntry> {
        let mut out = Vec::new();
        if root.is_dir() {
            self.collect_archives(root, Path::new(""), &mut out);
        }
        out.sort_by(|a, b| a.rel_path.to_string_lossy().cmp(&b.rel_path.to_string_lossy()));
        out
    }

    /// Image files under a single gallery directory, relative to that
    /// directory, in walker order. Non-recursive unless `recursive` is set
    /// (the `consider_images_in_subfolders` case).
    #[must_use]
    pub fn walk_gallery_images(&self, gallery_abs_dir: &Path, recursive: bool) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.collect_gallery_images(gallery_abs_dir, Path::new(""), recursive, &mut out);
        out
    }

    fn collect_gallery_images(
        &self,
        abs_dir: &Path,
        rel_dir: &Path,
        recursive: bool,
        out: &mut Vec<PathBuf>,
    ) {
        let Some(entries) = sorted_entries(abs_dir) else {
            return;
        };
        for entry in &entries {
            let rel_path = rel_dir.join(&entry.name);
            if entry.is_dir {
                if recursive {
                    self.collect_gallery_images(&abs_dir.join(&entry.name), &rel_path, recursive, out);
                }
            } else if self.config.is_image(Path::new(&entry.name)) {
                out.push(rel_path);
            }
        }
    }

    fn collect_archives(&self, abs_dir: &Path, rel_dir: &Path, out: &mut Vec<ArchiveEntry>) {
        let Some(entries) = sorted_entries(abs_dir) else {
            return;
        };
        for entry in &entries {
            let rel_path = rel_dir.join(&entry.name);
            if entry.is_dir {
                self.collect_archives(&abs_dir.join(&entry.name), &rel_path, out);
            } else if self.config.is_archive(Path::new(&entry.name)) {
                out.push(ArchiveEntry { rel_path });
            }
        }
    }
}

struct SortedEntry {
    name: String,
    is_dir: bool,
}

/// Read a directory's entries, sorted case-sensitive lexicographically by
/// name. Symlinks are never followed: a symlinked directory is treated as a
/// non-directory leaf (excluded entirely, matching "symlinks not followed").
fn sorted_entries(dir: &Path) -> Option<Vec<SortedEntry>> {
    let read_dir = fs::read_dir(dir).ok()?;
    let mut entries = Vec::new();
    for entry in read_dir.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push(SortedEntry {
            name,
            is_dir: file_type.is_dir(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Some(entries)
}
