//! Package-manager differs.
//!
//! Each manager enumerates an [`Inventory`]: package name to per-namespace
//! metadata. A namespace is an isolated package root inside one image, e.g.
//! one per python runtime or one per `node_modules` directory. OS package
//! databases use the single [`GLOBAL_NAMESPACE`].
//!
//! The two inventories are merged by package name. Packages whose entries
//! are identical in every namespace are left out of the result.

pub mod node;
pub mod os;
pub mod pip;

use super::ensure_root;
use crate::diff::{DiffResult, NamespacedInfo, PackageChange, PackageDiff};
use crate::error::DifferError;
use crate::image::Image;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Namespace used by package managers with one database per image.
pub const GLOBAL_NAMESPACE: &str = "global";

/// Installed packages of one image.
pub type Inventory = BTreeMap<String, NamespacedInfo>;

/// Enumerates an image's packages for one manager.
pub type Collector = fn(&Image) -> Result<Inventory, DifferError>;

/// Collects both inventories and merges them.
pub fn diff(
    manager: &str,
    image1: &Image,
    image2: &Image,
    collect: Collector,
) -> Result<DiffResult, DifferError> {
    ensure_root(image1.root())?;
    ensure_root(image2.root())?;

    let inventory1 = collect(image1)?;
    let inventory2 = collect(image2)?;
    debug!(
        manager,
        packages1 = inventory1.len(),
        packages2 = inventory2.len(),
        "Collected package inventories"
    );

    Ok(DiffResult::Package(diff_inventories(
        manager,
        image1.source(),
        image2.source(),
        &inventory1,
        &inventory2,
    )))
}

/// Merges two inventories by package name.
///
/// # Examples
///
/// ```
/// use idiff_rs::diff::PackageInfo;
/// use idiff_rs::differs::packages::{diff_inventories, Inventory};
///
/// let mut one = Inventory::new();
/// one.entry("six".to_string()).or_default()
///     .insert("python3.6".to_string(), PackageInfo::new("1.10.0", None));
/// let mut two = one.clone();
/// two.entry("six".to_string()).or_default()
///     .insert("python3.6".to_string(), PackageInfo::new("1.16.0", None));
///
/// let diff = diff_inventories("pip", "a", "b", &one, &two);
/// assert!(diff.differing.contains_key("six"));
/// ```
pub fn diff_inventories(
    manager: &str,
    image1: &str,
    image2: &str,
    inventory1: &Inventory,
    inventory2: &Inventory,
) -> PackageDiff {
    let mut only_in_1 = BTreeMap::new();
    let mut only_in_2 = BTreeMap::new();
    let mut differing = BTreeMap::new();

    for (name, entries1) in inventory1 {
        match inventory2.get(name) {
            None => {
                only_in_1.insert(name.clone(), entries1.clone());
            }
            Some(entries2) => {
                let change = namespace_changes(entries1, entries2);
                if !change.image1.is_empty() || !change.image2.is_empty() {
                    differing.insert(name.clone(), change);
                }
            }
        }
    }

    for (name, entries2) in inventory2 {
        if !inventory1.contains_key(name) {
            only_in_2.insert(name.clone(), entries2.clone());
        }
    }

    PackageDiff {
        manager: manager.to_string(),
        image1: image1.to_string(),
        image2: image2.to_string(),
        only_in_1,
        only_in_2,
        differing,
    }
}

/// Keeps the namespace entries that are not identical in both images.
fn namespace_changes(entries1: &NamespacedInfo, entries2: &NamespacedInfo) -> PackageChange {
    let namespaces: BTreeSet<&String> = entries1.keys().chain(entries2.keys()).collect();
    let mut change = PackageChange::default();

    for namespace in namespaces {
        let info1 = entries1.get(namespace);
        let info2 = entries2.get(namespace);
        if info1 == info2 {
            continue;
        }
        if let Some(info) = info1 {
            change.image1.insert(namespace.clone(), info.clone());
        }
        if let Some(info) = info2 {
            change.image2.insert(namespace.clone(), info.clone());
        }
    }
    change
}

/// Total size in bytes of the regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}

/// Joins an absolute in-image path onto the extracted root.
pub(crate) fn in_root(root: &Path, image_path: &str) -> std::path::PathBuf {
    root.join(image_path.trim_start_matches('/'))
}
