//! Python packages installed with pip.
//!
//! Every `pythonX.Y` directory under `usr/local/lib` or `usr/lib` is a
//! runtime, and its `site-packages`/`dist-packages` are enumerated under the
//! namespace `pythonX.Y`. Roots are scanned in import order, so a package
//! present under both keeps the `usr/local/lib` entry. Directories on the
//! image's `PYTHONPATH` become extra namespaces named by their in-image path.

use super::{dir_size, in_root, Inventory};
use crate::diff::PackageInfo;
use crate::error::DifferError;
use crate::image::Image;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

const LIB_ROOTS: [&str; 2] = ["usr/local/lib", "usr/lib"];
const PACKAGE_DIRS: [&str; 2] = ["site-packages", "dist-packages"];
const METADATA_SUFFIXES: [&str; 2] = [".dist-info", ".egg-info"];

pub fn inventory(image: &Image) -> Result<Inventory, DifferError> {
    let root = image.root();
    let mut inventory = Inventory::new();

    for version in python_versions(root)? {
        for lib in LIB_ROOTS {
            for packages in PACKAGE_DIRS {
                let dir = root.join(lib).join(&version).join(packages);
                if dir.is_dir() {
                    scan_packages(&dir, &version, &mut inventory)?;
                }
            }
        }
    }

    if let Some(pythonpath) = image.env_var("PYTHONPATH") {
        for entry in pythonpath.split(':').filter(|p| p.starts_with('/')) {
            let dir = in_root(root, entry);
            if dir.is_dir() {
                scan_packages(&dir, entry, &mut inventory)?;
            } else {
                debug!(path = entry, "PYTHONPATH entry not present in image");
            }
        }
    }

    Ok(inventory)
}

/// Returns the sorted `pythonX.Y` runtimes found under the library roots.
///
/// A missing library root is skipped; one that exists but is not a
/// directory is an error.
pub fn python_versions(root: &Path) -> Result<Vec<String>, DifferError> {
    let mut versions = BTreeSet::new();

    for lib in LIB_ROOTS {
        let lib_dir = root.join(lib);
        let Ok(metadata) = fs::metadata(&lib_dir) else {
            continue;
        };
        if !metadata.is_dir() {
            return Err(DifferError::not_a_directory(lib_dir.display().to_string()));
        }

        let entries = fs::read_dir(&lib_dir)
            .map_err(|e| DifferError::io(lib_dir.display().to_string(), e))?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_python_version(&name) && entry.path().is_dir() {
                versions.insert(name);
            }
        }
    }

    Ok(versions.into_iter().collect())
}

fn is_python_version(name: &str) -> bool {
    let Some(version) = name.strip_prefix("python") else {
        return false;
    };
    let Some((major, minor)) = version.split_once('.') else {
        return false;
    };
    [major, minor]
        .iter()
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Splits `name-1.0.dist-info` / `name-1.0-py3.6.egg-info` into name and
/// version.
fn parse_metadata_name(entry: &str) -> Option<(String, Option<String>)> {
    let stem = METADATA_SUFFIXES
        .iter()
        .find_map(|suffix| entry.strip_suffix(suffix))?;
    let mut parts = stem.splitn(3, '-');
    let name = parts.next().filter(|n| !n.is_empty())?;
    let version = parts.next().map(str::to_string);
    Some((name.to_string(), version))
}

fn scan_packages(dir: &Path, namespace: &str, inventory: &mut Inventory) -> Result<(), DifferError> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| DifferError::io(dir.display().to_string(), e))?
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut claimed = BTreeSet::new();
    for entry in &names {
        let Some((name, version)) = parse_metadata_name(entry) else {
            continue;
        };
        let module = [name.clone(), name.to_lowercase()]
            .into_iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_dir());
        let size = match &module {
            Some(path) => dir_size(path),
            None => dir_size(&dir.join(entry)),
        };
        if let Some(path) = &module {
            claimed.insert(path.clone());
        }

        let key = name.to_lowercase();
        inventory
            .entry(key)
            .or_default()
            .entry(namespace.to_string())
            .or_insert(PackageInfo {
                version,
                size: Some(size),
            });
    }

    for entry in &names {
        let path = dir.join(entry);
        let loose_script = entry.ends_with(".py") && path.is_file();
        let bare_package = path.is_dir()
            && !claimed.contains(&path)
            && path.join("__init__.py").is_file();
        if loose_script || bare_package {
            inventory
                .entry(entry.clone())
                .or_default()
                .entry(namespace.to_string())
                .or_insert_with(PackageInfo::default);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_python_version() {
        assert!(is_python_version("python3.6"));
        assert!(is_python_version("python2.7"));
        assert!(is_python_version("python3.11"));
        assert!(!is_python_version("python3"));
        assert!(!is_python_version("python"));
        assert!(!is_python_version("python3.x"));
        assert!(!is_python_version("perl5.30"));
    }

    #[test]
    fn test_parse_metadata_name() {
        assert_eq!(
            parse_metadata_name("packageone-3.6.9.dist-info"),
            Some(("packageone".to_string(), Some("3.6.9".to_string())))
        );
        assert_eq!(
            parse_metadata_name("six-1.10.0-py3.6.egg-info"),
            Some(("six".to_string(), Some("1.10.0".to_string())))
        );
        assert_eq!(
            parse_metadata_name("bare.egg-info"),
            Some(("bare".to_string(), None))
        );
        assert_eq!(parse_metadata_name("script.py"), None);
    }
}
