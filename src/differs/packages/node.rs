//! Node packages, one namespace per `node_modules` directory.

use super::{dir_size, Inventory};
use crate::diff::PackageInfo;
use crate::differs::image_path;
use crate::error::DifferError;
use crate::image::Image;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

pub fn inventory(image: &Image) -> Result<Inventory, DifferError> {
    let root = image.root();
    let mut inventory = Inventory::new();

    let modules_dirs = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == "node_modules");

    for modules in modules_dirs {
        let namespace = image_path(root, modules.path());
        for package in package_dirs(modules.path())? {
            let (name, info) = read_package(&package);
            inventory.entry(name).or_default().insert(namespace.clone(), info);
        }
    }

    Ok(inventory)
}

/// Lists `<pkg>` and `@scope/<pkg>` directories that carry a `package.json`.
fn package_dirs(modules: &Path) -> Result<Vec<std::path::PathBuf>, DifferError> {
    let mut packages = Vec::new();
    for entry in read_dir_sorted(modules)? {
        let name = entry.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.starts_with('@') && entry.is_dir() {
            packages.extend(
                read_dir_sorted(&entry)?
                    .into_iter()
                    .filter(|p| p.join("package.json").is_file()),
            );
        } else if entry.join("package.json").is_file() {
            packages.push(entry);
        }
    }
    Ok(packages)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<std::path::PathBuf>, DifferError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| DifferError::io(dir.display().to_string(), e))?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

/// Reads name and version from `package.json`; a manifest that cannot be
/// parsed is recorded under the directory name with empty metadata.
fn read_package(dir: &Path) -> (String, PackageInfo) {
    let fallback_name = || {
        let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match dir.parent().and_then(|p| p.file_name()).map(|p| p.to_string_lossy()) {
            Some(scope) if scope.starts_with('@') => format!("{}/{}", scope, name),
            _ => name,
        }
    };

    let manifest_path = dir.join("package.json");
    let manifest = fs::read(&manifest_path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<PackageJson>(&bytes).ok());

    match manifest {
        Some(manifest) => (
            manifest.name.unwrap_or_else(fallback_name),
            PackageInfo {
                version: manifest.version,
                size: Some(dir_size(dir)),
            },
        ),
        None => {
            debug!(path = %manifest_path.display(), "Unreadable package.json");
            (fallback_name(), PackageInfo::default())
        }
    }
}
