//! Tar archive extraction and layer unioning.
//!
//! Archives may be plain or gzip-compressed; compression is detected from
//! the stream's magic bytes rather than the file name. Layers are applied on
//! top of each other with OCI whiteout semantics: `.wh.<name>` deletes
//! `<name>` from lower layers and `.wh..wh..opq` empties its directory.

use crate::error::AcquireError;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One entry of a `docker save` style `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SavedManifest {
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub layers: Vec<String>,
}

/// Wraps `reader` in a gzip decoder when the stream starts with gzip magic.
pub fn decompressed<'a, R: Read + 'a>(reader: R) -> std::io::Result<Box<dyn Read + 'a>> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Extracts the archive at `archive` into `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), AcquireError> {
    let label = archive.display().to_string();
    let file = fs::File::open(archive).map_err(|e| AcquireError::io(&label, e))?;
    let reader = decompressed(file).map_err(|e| AcquireError::io(&label, e))?;
    fs::create_dir_all(dest).map_err(|e| AcquireError::io(dest.display().to_string(), e))?;
    unpack(reader, dest, &label, false)
}

/// Applies one layer stream on top of `rootfs`, honoring whiteouts.
pub fn apply_layer<R: Read>(reader: R, rootfs: &Path, label: &str) -> Result<(), AcquireError> {
    let reader = decompressed(reader).map_err(|e| AcquireError::io(label, e))?;
    unpack(reader, rootfs, label, true)
}

fn unpack<R: Read>(reader: R, dest: &Path, label: &str, whiteouts: bool) -> Result<(), AcquireError> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let entries = archive
        .entries()
        .map_err(|e| AcquireError::extraction(label, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| AcquireError::extraction(label, e))?;
        let path = entry
            .path()
            .map_err(|e| AcquireError::extraction(label, e))?
            .into_owned();

        if !is_contained(&path) {
            return Err(AcquireError::PathTraversal {
                archive: label.to_string(),
                path: path.display().to_string(),
            });
        }

        let kind = entry.header().entry_type();
        if kind.is_character_special() || kind.is_block_special() || kind.is_fifo() {
            debug!(path = %path.display(), "Skipping special file");
            continue;
        }

        if whiteouts {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if let Some(target) = name.strip_prefix(WHITEOUT_PREFIX) {
                let relative = path.parent().unwrap_or(Path::new(""));
                if crosses_symlink(dest, relative) {
                    warn!(path = %path.display(), "Skipping whiteout below a symlink");
                    continue;
                }
                let parent = dest.join(relative);
                if name == OPAQUE_WHITEOUT {
                    clear_directory(&parent)?;
                } else {
                    remove_path(&parent.join(target))?;
                }
                continue;
            }
        }

        entry
            .unpack_in(dest)
            .map_err(|e| AcquireError::extraction(label, e))?;
    }

    Ok(())
}

/// Rejects absolute paths and `..` components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// True when an existing component of `relative` below `root` is a symlink.
fn crosses_symlink(root: &Path, relative: &Path) -> bool {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

fn remove_path(target: &Path) -> Result<(), AcquireError> {
    let Ok(metadata) = fs::symlink_metadata(target) else {
        return Ok(());
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    result.map_err(|e| AcquireError::io(target.display().to_string(), e))
}

fn clear_directory(dir: &Path) -> Result<(), AcquireError> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries {
        let entry = entry.map_err(|e| AcquireError::io(dir.display().to_string(), e))?;
        remove_path(&entry.path())?;
    }
    Ok(())
}

/// Reads `manifest.json` from an extracted saved-image archive, if present.
pub fn read_saved_manifest(extracted: &Path) -> Result<Option<SavedManifest>, AcquireError> {
    let path = extracted.join("manifest.json");
    if !path.is_file() {
        return Ok(None);
    }
    let label = path.display().to_string();
    let bytes = fs::read(&path).map_err(|e| AcquireError::io(&label, e))?;
    let manifests: Vec<SavedManifest> = serde_json::from_slice(&bytes)
        .map_err(|source| AcquireError::InvalidConfig { origin: label, source })?;
    Ok(manifests.into_iter().next())
}

/// Applies the layers listed in `manifest` from `extracted` onto `rootfs`.
pub fn union_layers(
    extracted: &Path,
    manifest: &SavedManifest,
    rootfs: &Path,
) -> Result<(), AcquireError> {
    for layer in &manifest.layers {
        let layer_path: PathBuf = extracted.join(layer);
        let label = layer_path.display().to_string();
        debug!(layer = %layer, "Applying layer");
        let file = fs::File::open(&layer_path).map_err(|e| AcquireError::io(&label, e))?;
        apply_layer(file, rootfs, &label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn layer(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_600_000_000);
            builder.append_data(&mut header, path, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_later_layers_overwrite_earlier() {
        let dir = TempDir::new().unwrap();
        apply_layer(&layer(&[("etc/motd", "one")])[..], dir.path(), "l1").unwrap();
        apply_layer(&layer(&[("etc/motd", "two")])[..], dir.path(), "l2").unwrap();
        assert_eq!(fs::read(dir.path().join("etc/motd")).unwrap(), b"two");
    }

    #[test]
    fn test_gzip_layers_are_detected() {
        let dir = TempDir::new().unwrap();
        let data = gzip(&layer(&[("bin/tool", "#!/bin/sh")]));
        apply_layer(&data[..], dir.path(), "gz").unwrap();
        assert!(dir.path().join("bin/tool").is_file());
    }

    #[test]
    fn test_whiteout_removes_lower_file() {
        let dir = TempDir::new().unwrap();
        apply_layer(
            &layer(&[("etc/keep", "k"), ("etc/drop", "d")])[..],
            dir.path(),
            "l1",
        )
        .unwrap();
        apply_layer(&layer(&[("etc/.wh.drop", "")])[..], dir.path(), "l2").unwrap();
        assert!(dir.path().join("etc/keep").exists());
        assert!(!dir.path().join("etc/drop").exists());
        assert!(!dir.path().join("etc/.wh.drop").exists());
    }

    #[test]
    fn test_opaque_whiteout_clears_directory() {
        let dir = TempDir::new().unwrap();
        apply_layer(&layer(&[("var/cache/a", "a")])[..], dir.path(), "l1").unwrap();
        apply_layer(
            &layer(&[("var/cache/.wh..wh..opq", ""), ("var/cache/b", "b")])[..],
            dir.path(),
            "l2",
        )
        .unwrap();
        assert!(!dir.path().join("var/cache/a").exists());
        assert!(dir.path().join("var/cache/b").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_crosses_symlink() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("etc/ssl")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        assert!(!crosses_symlink(dir.path(), Path::new("etc/ssl")));
        assert!(!crosses_symlink(dir.path(), Path::new("etc/missing/deeper")));
        assert!(!crosses_symlink(dir.path(), Path::new("")));
        assert!(crosses_symlink(dir.path(), Path::new("escape")));
        assert!(crosses_symlink(dir.path(), Path::new("escape/sub")));
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("etc/passwd")));
        assert!(is_contained(Path::new("./etc/passwd")));
        assert!(!is_contained(Path::new("../etc/passwd")));
        assert!(!is_contained(Path::new("/etc/passwd")));
    }

    #[test]
    fn test_extract_plain_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("rootfs.tar");
        fs::write(&archive, layer(&[("usr/bin/app", "app")])).unwrap();
        let dest = dir.path().join("out");
        extract(&archive, &dest).unwrap();
        assert_eq!(fs::read(dest.join("usr/bin/app")).unwrap(), b"app");
    }

    #[test]
    fn test_read_saved_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(read_saved_manifest(dir.path()).unwrap().is_none());
        fs::write(
            dir.path().join("manifest.json"),
            r#"[{"Config":"abc.json","RepoTags":["app:1"],"Layers":["l1/layer.tar"]}]"#,
        )
        .unwrap();
        let manifest = read_saved_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.config.as_deref(), Some("abc.json"));
        assert_eq!(manifest.layers, vec!["l1/layer.tar"]);
    }
}
