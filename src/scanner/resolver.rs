//! Output path resolver: maps a source-relative path to a physical target
//! path and a virtual display path, honoring nesting replication and
//! lanraragi-style flattening.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Scan-local resolver state. `flatten_name_map` must never be shared across
/// scans — it is rebuilt fresh for every scan.
#[derive(Debug, Default)]
pub struct OutputPathResolver {
    flatten_name_map: HashMap<String, PathBuf>,
}

impl OutputPathResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `rel_path` (source-relative) to `(physical, virtual)` target
    /// paths under `output_root`.
    pub fn resolve(
        &mut self,
        output_root: &Path,
        rel_path: &Path,
        replicate_nesting: bool,
        lanraragi_flatten: bool,
    ) -> (PathBuf, PathBuf) {
        let virtual_path = virtual_path(output_root, rel_path, replicate_nesting);

        if !lanraragi_flatten {
            return (virtual_path.clone(), virtual_path);
        }

        let basename = virtual_path
            .file_name()
            .map(std::ffi::OsStr::to_string_lossy)
            .map(|s| s.into_owned())
            .unwrap_or_default();

        let physical = match self.flatten_name_map.get(&basename) {
            Some(claimed_by) if claimed_by == rel_path => output_root.join(&basename),
            Some(_different_source) => {
                let disambiguated = disambiguate(&basename, rel_path);
                output_root.join(disambiguated)
            }
            None => {
                self.flatten_name_map
                    .insert(basename.clone(), rel_path.to_path_buf());
                output_root.join(&basename)
            }
        };

        (physical, virtual_path)
    }
}

/// Non-mutating preview of the virtual path for `rel_path`, for callers
/// (skip/container actions) that need a display path without claiming a
/// flatten-disambiguation slot.
#[must_use]
pub fn preview_virtual(output_root: &Path, rel_path: &Path, replicate_nesting: bool) -> PathBuf {
    virtual_path(output_root, rel_path, replicate_nesting)
}

fn virtual_path(output_root: &Path, rel_path: &Path, replicate_nesting: bool) -> PathBuf {
    if replicate_nesting {
        return output_root.join(rel_path);
    }

    let components: Vec<_> = rel_path.components().collect();
    let basename = rel_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| rel_path.to_path_buf());

    if components.len() >= 2 {
        let first = components[0].as_os_str();
        output_root.join(first).join(basename)
    } else {
        output_root.join(basename)
    }
}

/// `stem + "__" + shortHash(fullRelPath) + ext`, where `shortHash` is the
/// first 8 hex characters of a SHA-256 digest over the UTF-8 bytes of the
/// full relative path.
fn disambiguate(basename: &str, rel_path: &Path) -> String {
    let path = Path::new(basename);
    let stem = path
        .file_stem()
        .map(std::ffi::OsStr::to_string_lossy)
        .unwrap_or_default();
    let ext = path.extension().map(std::ffi::OsStr::to_string_lossy);

    let mut hasher = Sha256::new();
    hasher.update(rel_path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let short_hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    match ext {
        Some(ext) if !ext.is_empty() => format!("{stem}__{short_hash}.{ext}"),
        _ => format!("{stem}__{short_hash}"),
    }
}
