//! Diff result types.
//!
//! Every differ produces one [`DiffResult`]. The variants share a common
//! [`DiffStats`] view so callers can summarize a report without knowing which
//! differs ran.
//!
//! All collections are ordered (`BTreeMap`, sorted `Vec`s) so structured
//! output is stable across runs.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::diff::{DiffResult, HistoryDiff};
//!
//! let diff = DiffResult::History(HistoryDiff {
//!     image1: "base.tar".to_string(),
//!     image2: "app.tar".to_string(),
//!     additions: vec!["RUN b".to_string()],
//!     deletions: vec!["RUN a".to_string()],
//! });
//!
//! assert_eq!(diff.stats().added, 1);
//! assert_eq!(diff.stats().removed, 1);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

/// Statistics about a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Entries present only in the second image
    pub added: usize,
    /// Entries present only in the first image
    pub removed: usize,
    /// Entries present in both images with different metadata
    pub modified: usize,
}

impl DiffStats {
    /// Returns the total number of changes.
    pub fn total_changes(&self) -> usize {
        self.added + self.removed + self.modified
    }

    /// Returns true if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }
}

impl std::ops::AddAssign for DiffStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.modified += other.modified;
    }
}

/// Output of a single differ. The variant selects its render template.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffResult {
    History(HistoryDiff),
    Package(PackageDiff),
    FileSystem(FileSystemDiff),
}

impl DiffResult {
    pub fn stats(&self) -> DiffStats {
        match self {
            DiffResult::History(diff) => DiffStats {
                added: diff.additions.len(),
                removed: diff.deletions.len(),
                modified: 0,
            },
            DiffResult::Package(diff) => DiffStats {
                added: diff.only_in_2.len(),
                removed: diff.only_in_1.len(),
                modified: diff.differing.len(),
            },
            DiffResult::FileSystem(diff) => DiffStats {
                added: diff.only_in_2.len(),
                removed: diff.only_in_1.len(),
                modified: diff.changed.len(),
            },
        }
    }

    /// Returns true if the two images are identical for this differ.
    pub fn is_empty(&self) -> bool {
        self.stats().is_empty()
    }
}

/// Build-history entries unique to either image, in matcher order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryDiff {
    pub image1: String,
    pub image2: String,
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
}

/// Resolvable metadata of one installed package. Either field may be
/// missing when the package database does not record it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageInfo {
    pub version: Option<String>,
    pub size: Option<u64>,
}

impl PackageInfo {
    pub fn new(version: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            version: Some(version.into()),
            size,
        }
    }
}

/// Package metadata keyed by namespace (`python3.6`, `/app/node_modules`,
/// `global`, ...).
pub type NamespacedInfo = BTreeMap<String, PackageInfo>;

/// Namespace entries of a package that differ between the two images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageChange {
    pub image1: NamespacedInfo,
    pub image2: NamespacedInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDiff {
    /// Package manager key (`pip`, `node`, `apt`, ...)
    pub manager: String,
    pub image1: String,
    pub image2: String,
    pub only_in_1: BTreeMap<String, NamespacedInfo>,
    pub only_in_2: BTreeMap<String, NamespacedInfo>,
    pub differing: BTreeMap<String, PackageChange>,
}

/// Metadata compared by the filesystem differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    pub size: u64,
    pub mode: u32,
    /// Seconds since the epoch, when available
    pub modified: Option<u64>,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub image1: FileMeta,
    pub image2: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSystemDiff {
    pub image1: String,
    pub image2: String,
    pub only_in_1: Vec<String>,
    pub only_in_2: Vec<String>,
    pub changed: Vec<FileChange>,
}
