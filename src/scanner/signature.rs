//! Signature calculator: content-identity fingerprints for galleries and
//! archives, derived purely from filesystem metadata (no content hashing).

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use crate::core::errors::Result;
use crate::scanner::types::Signature;

/// Compute a gallery's signature by summing sizes and maxing mtimes over its
/// full image list. Unreadable files are treated as zero-size / epoch-mtime
/// rather than aborting the scan (planner predicate errors fall through to
/// "no signature" per the error handling design, but a missing stat for one
/// of many images should not poison the whole gallery).
#[must_use]
pub fn gallery_signature(images: &[std::path::PathBuf]) -> Signature {
    let mut total_image_bytes: u64 = 0;
    let mut newest_mtime: f64 = 0.0;

    for image in images {
        if let Ok(meta) = fs::metadata(image) {
            total_image_bytes += meta.len();
            if let Ok(modified) = meta.modified() {
                let secs = modified
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                if secs > newest_mtime {
                    newest_mtime = secs;
                }
            }
        }
    }

    Signature::Gallery {
        image_count: images.len() as u64,
        total_image_bytes,
        newest_mtime,
    }
}

/// Compute an archive's signature from its stat size and mtime.
pub fn archive_signature(path: &Path) -> Result<Signature> {
    let meta = fs::metadata(path).map_err(|source| crate::core::errors::GlError::io(path, source))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Signature::Archive {
        size: meta.len(),
        mtime,
    })
}
