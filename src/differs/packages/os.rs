//! OS package databases: dpkg (`apt`) and apk.

use super::{Inventory, GLOBAL_NAMESPACE};
use crate::diff::PackageInfo;
use crate::error::DifferError;
use crate::image::Image;
use std::fs;
use std::path::Path;
use tracing::debug;

const DPKG_STATUS: &str = "var/lib/dpkg/status";
const APK_INSTALLED: &str = "lib/apk/db/installed";

pub fn dpkg_inventory(image: &Image) -> Result<Inventory, DifferError> {
    Ok(read_database(image.root(), DPKG_STATUS)?
        .map(|contents| parse_dpkg_status(&contents))
        .unwrap_or_default())
}

pub fn apk_inventory(image: &Image) -> Result<Inventory, DifferError> {
    Ok(read_database(image.root(), APK_INSTALLED)?
        .map(|contents| parse_apk_installed(&contents))
        .unwrap_or_default())
}

/// dpkg when the image has a dpkg database, apk otherwise.
pub fn linux_inventory(image: &Image) -> Result<Inventory, DifferError> {
    if image.root().join(DPKG_STATUS).exists() {
        dpkg_inventory(image)
    } else {
        apk_inventory(image)
    }
}

fn read_database(root: &Path, relative: &str) -> Result<Option<String>, DifferError> {
    let path = root.join(relative);
    match fs::read(&path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No package database");
            Ok(None)
        }
        Err(e) => Err(DifferError::io(path.display().to_string(), e)),
    }
}

fn insert(inventory: &mut Inventory, name: String, info: PackageInfo) {
    inventory
        .entry(name)
        .or_default()
        .insert(GLOBAL_NAMESPACE.to_string(), info);
}

/// Parses a dpkg status file. Only installed packages are kept;
/// `Installed-Size` is in KiB.
pub fn parse_dpkg_status(contents: &str) -> Inventory {
    let mut inventory = Inventory::new();

    for stanza in contents.split("\n\n") {
        let mut name = None;
        let mut version = None;
        let mut size = None;
        let mut installed = false;

        for line in stanza.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match field {
                "Package" => name = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "Installed-Size" => {
                    size = value.parse::<u64>().ok().and_then(|kib| kib.checked_mul(1024))
                }
                "Status" => installed = value.split_whitespace().last() == Some("installed"),
                _ => {}
            }
        }

        if let (Some(name), true) = (name, installed) {
            insert(&mut inventory, name, PackageInfo { version, size });
        }
    }

    inventory
}

/// Parses an apk `installed` database (`P:` name, `V:` version, `I:` bytes).
pub fn parse_apk_installed(contents: &str) -> Inventory {
    let mut inventory = Inventory::new();

    for stanza in contents.split("\n\n") {
        let mut name = None;
        let mut info = PackageInfo::default();

        for line in stanza.lines() {
            match line.split_once(':') {
                Some(("P", value)) => name = Some(value.trim().to_string()),
                Some(("V", value)) => info.version = Some(value.trim().to_string()),
                Some(("I", value)) => info.size = value.trim().parse().ok(),
                _ => {}
            }
        }

        if let Some(name) = name {
            insert(&mut inventory, name, info);
        }
    }

    inventory
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
Package: bash
Status: install ok installed
Installed-Size: 6469
Version: 5.0-4
Description: GNU Bourne Again SHell
 Bash is an sh-compatible command language interpreter.

Package: removed-pkg
Status: deinstall ok config-files
Version: 1.0

Package: zlib1g
Status: install ok installed
Version: 1:1.2.11.dfsg-1
";

    #[test]
    fn test_parse_dpkg_status() {
        let inventory = parse_dpkg_status(STATUS);
        assert_eq!(inventory.len(), 2);
        let bash = &inventory["bash"][GLOBAL_NAMESPACE];
        assert_eq!(bash.version.as_deref(), Some("5.0-4"));
        assert_eq!(bash.size, Some(6469 * 1024));
        let zlib = &inventory["zlib1g"][GLOBAL_NAMESPACE];
        assert_eq!(zlib.version.as_deref(), Some("1:1.2.11.dfsg-1"));
        assert_eq!(zlib.size, None);
        assert!(!inventory.contains_key("removed-pkg"));
    }

    #[test]
    fn test_oversized_installed_size_is_unknown() {
        let status = "Package: huge\nStatus: install ok installed\nVersion: 1.0\nInstalled-Size: 18446744073709551\n";
        let inventory = parse_dpkg_status(status);
        let huge = &inventory["huge"][GLOBAL_NAMESPACE];
        assert_eq!(huge.version.as_deref(), Some("1.0"));
        assert_eq!(huge.size, None);
    }

    #[test]
    fn test_parse_apk_installed() {
        let db = "C:Q1abc=\nP:musl\nV:1.2.3-r4\nI:622592\n\nP:busybox\nV:1.35.0-r17\n";
        let inventory = parse_apk_installed(db);
        assert_eq!(
            inventory["musl"][GLOBAL_NAMESPACE],
            PackageInfo::new("1.2.3-r4", Some(622592))
        );
        assert_eq!(inventory["busybox"][GLOBAL_NAMESPACE].size, None);
    }

    #[test]
    fn test_missing_database_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read_database(dir.path(), DPKG_STATUS).unwrap().is_none());
    }
}
