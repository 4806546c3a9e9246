//! Differ registry.
//!
//! Differ kinds form a closed set, selected by a static key table. Each
//! differ is a pure function of the two images (plus [`DiffOptions`]) and
//! never mutates the extracted filesystems, so differs can run concurrently
//! against the same pair.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::differs::DifferKind;
//!
//! assert_eq!(DifferKind::from_key("hist"), Some(DifferKind::History));
//! assert_eq!(DifferKind::from_key(" PIP "), Some(DifferKind::Pip));
//! assert_eq!(DifferKind::from_key("foo"), None);
//! assert_eq!(DifferKind::History.key(), "history");
//! ```

pub mod filesystem;
pub mod history;
pub mod packages;

use crate::diff::DiffResult;
use crate::error::DifferError;
use crate::filter::FilterConfig;
use crate::image::Image;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The available differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferKind {
    History,
    File,
    Apt,
    Apk,
    Linux,
    Pip,
    Node,
}

/// Accepted differ keys. Several keys may name the same kind.
pub const DIFFER_KEYS: [(&str, DifferKind); 8] = [
    ("hist", DifferKind::History),
    ("history", DifferKind::History),
    ("file", DifferKind::File),
    ("apt", DifferKind::Apt),
    ("apk", DifferKind::Apk),
    ("linux", DifferKind::Linux),
    ("pip", DifferKind::Pip),
    ("node", DifferKind::Node),
];

impl DifferKind {
    /// Looks up a differ by key, case-insensitively.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        DIFFER_KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
    }

    /// Canonical key, used to label results.
    pub fn key(&self) -> &'static str {
        match self {
            DifferKind::History => "history",
            DifferKind::File => "file",
            DifferKind::Apt => "apt",
            DifferKind::Apk => "apk",
            DifferKind::Linux => "linux",
            DifferKind::Pip => "pip",
            DifferKind::Node => "node",
        }
    }

    /// Runs this differ against the image pair.
    pub fn run(
        &self,
        image1: &Image,
        image2: &Image,
        options: &DiffOptions,
    ) -> Result<DiffResult, DifferError> {
        use packages::{node, os, pip};

        match self {
            DifferKind::History => Ok(DiffResult::History(history::diff(image1, image2))),
            DifferKind::File => filesystem::diff(image1, image2, options).map(DiffResult::FileSystem),
            DifferKind::Apt => packages::diff(self.key(), image1, image2, os::dpkg_inventory),
            DifferKind::Apk => packages::diff(self.key(), image1, image2, os::apk_inventory),
            DifferKind::Linux => packages::diff(self.key(), image1, image2, os::linux_inventory),
            DifferKind::Pip => packages::diff(self.key(), image1, image2, pip::inventory),
            DifferKind::Node => packages::diff(self.key(), image1, image2, node::inventory),
        }
    }
}

impl fmt::Display for DifferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How far the filesystem differ walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkDepth {
    /// Top-level entries only
    Shallow,
    #[default]
    Deep,
}

/// Parameters shared by all differs.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub depth: WalkDepth,
    pub filter: FilterConfig,
}

/// Fails unless `root` exists and is a directory.
pub(crate) fn ensure_root(root: &Path) -> Result<(), DifferError> {
    match std::fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(DifferError::not_a_directory(root.display().to_string())),
        Err(_) => Err(DifferError::MissingRoot {
            path: root.display().to_string(),
        }),
    }
}

/// Converts a path below `root` into an absolute in-image path.
pub(crate) fn image_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", joined.join("/"))
}
