//! Gallery classifier: decides which directories qualify as galleries, and
//! which ancestor directories are containers that must exist in the output
//! tree when nesting is replicated.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::config::Settings;
use crate::scanner::types::ReasonCode;
use crate::scanner::walker::DirRollup;

/// Outcome of classifying one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The directory qualifies as a gallery.
    Gallery,
    /// The directory holds no images and is a leaf: nothing to do here.
    SkipNoImages,
    /// The directory has some images but not enough to qualify.
    SkipBelowMin,
    /// The directory neither qualifies nor needs a skip action (e.g. a
    /// container with no images whose descendants do qualify).
    Container,
}

/// Classify every rollup produced by a walk, in walker order.
#[must_use]
pub fn classify(rollups: &[DirRollup], settings: &Settings) -> Vec<(DirRollup, Classification)> {
    rollups
        .iter()
        .cloned()
        .map(|rollup| {
            let classification = classify_one(&rollup, settings);
            (rollup, classification)
        })
        .collect()
}

fn classify_one(rollup: &DirRollup, settings: &Settings) -> Classification {
    let min = settings.min_images_to_be_gallery as u64;

    let qualifies = rollup.direct_images >= min
        || (settings.leaf_only && rollup.is_leaf && rollup.direct_images >= 1)
        || (!settings.leaf_only
            && settings.consider_images_in_subfolders
            && rollup.total_images >= min);

    if qualifies {
        return Classification::Gallery;
    }

    if rollup.direct_images == 0 && rollup.is_leaf {
        return Classification::SkipNoImages;
    }
    if rollup.direct_images > 0 && rollup.direct_images < min {
        return Classification::SkipBelowMin;
    }
    Classification::Container
}

impl Classification {
    #[must_use]
    pub const fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            Self::SkipNoImages => Some(ReasonCode::SkipNoImages),
            Self::SkipBelowMin => Some(ReasonCode::SkipBelowMinImages),
            Self::Gallery | Self::Container => None,
        }
    }
}

/// Every ancestor directory of a qualifying gallery whose own
/// `direct_images == 0`, deduplicated and returned in arbitrary order
/// (callers that need determinism should sort by path).
#[must_use]
pub fn container_directories(
    rollups: &[DirRollup],
    gallery_dirs: &[PathBuf],
) -> BTreeSet<PathBuf> {
    let direct_images_zero: BTreeSet<&Path> = rollups
        .iter()
        .filter(|r| r.direct_images == 0)
        .map(|r| r.rel_dir.as_path())
        .collect();

    let mut containers = BTreeSet::new();
    for gallery_dir in gallery_dirs {
        let mut ancestor = gallery_dir.parent();
        while let Some(dir) = ancestor {
            if dir.as_os_str().is_empty() {
                break;
            }
            if direct_images_zero.contains(dir) {
                containers.insert(dir.to_path_buf());
            }
            ancestor = dir.parent();
        }
    }
    containers
}
