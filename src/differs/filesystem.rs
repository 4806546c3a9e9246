//! Filesystem tree differ.
//!
//! Walks both extracted roots and compares entry metadata (size, mode,
//! mtime). Directories are compared by mode only. File contents are never
//! read.

use super::{ensure_root, image_path, DiffOptions, WalkDepth};
use crate::diff::{FileChange, FileMeta, FileSystemDiff};
use crate::error::DifferError;
use crate::image::Image;
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

pub fn diff(
    image1: &Image,
    image2: &Image,
    options: &DiffOptions,
) -> Result<FileSystemDiff, DifferError> {
    let tree1 = snapshot(image1.root(), options)?;
    let tree2 = snapshot(image2.root(), options)?;
    debug!(entries1 = tree1.len(), entries2 = tree2.len(), "Walked filesystems");

    let filter = &options.filter;
    let only_in_1 = tree1
        .keys()
        .filter(|path| !tree2.contains_key(*path) && filter.should_include(path))
        .cloned()
        .collect();
    let only_in_2 = tree2
        .keys()
        .filter(|path| !tree1.contains_key(*path) && filter.should_include(path))
        .cloned()
        .collect();

    let changed = tree1
        .iter()
        .filter_map(|(path, meta1)| {
            let meta2 = tree2.get(path)?;
            (is_changed(meta1, meta2) && filter.should_include(path)).then(|| FileChange {
                path: path.clone(),
                image1: *meta1,
                image2: *meta2,
            })
        })
        .collect();

    Ok(FileSystemDiff {
        image1: image1.source().to_string(),
        image2: image2.source().to_string(),
        only_in_1,
        only_in_2,
        changed,
    })
}

fn is_changed(meta1: &FileMeta, meta2: &FileMeta) -> bool {
    if meta1.is_dir && meta2.is_dir {
        meta1.mode != meta2.mode
    } else {
        meta1 != meta2
    }
}

/// Collects metadata for every entry below `root`, keyed by in-image path.
pub fn snapshot(root: &Path, options: &DiffOptions) -> Result<BTreeMap<String, FileMeta>, DifferError> {
    ensure_root(root)?;

    let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
    if options.depth == WalkDepth::Shallow {
        walker = walker.max_depth(1);
    }

    let mut entries = BTreeMap::new();
    let walk = walker
        .into_iter()
        .filter_entry(|entry| options.filter.should_descend(&image_path(root, entry.path())));

    for entry in walk {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string());
            DifferError::io(path, e.into())
        })?;
        let metadata = entry
            .metadata()
            .map_err(|e| DifferError::io(entry.path().display().to_string(), e.into()))?;
        entries.insert(image_path(root, entry.path()), file_meta(&metadata));
    }

    Ok(entries)
}

fn file_meta(metadata: &Metadata) -> FileMeta {
    let is_dir = metadata.is_dir();
    FileMeta {
        size: if is_dir { 0 } else { metadata.len() },
        mode: mode(metadata),
        modified: metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
        is_dir,
    }
}

#[cfg(unix)]
fn mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
