//! Tar-archive backend.
//!
//! Accepts saved images (`docker save`, OCI layout with `manifest.json`) and
//! plain root filesystem archives. The archive is extracted once into the
//! acquisition's workdir and shared by metadata and filesystem resolution.

use super::Workdir;
use crate::archive;
use crate::error::AcquireError;
use crate::image::{ConfigBlob, Diagnostic, ImageMetadata};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXCLUDED_CONFIGS: [&str; 2] = ["manifest.json", "index.json"];

pub struct TarBackend {
    archive: PathBuf,
    extracted: Option<PathBuf>,
}

impl TarBackend {
    pub fn new(archive: &str) -> Self {
        Self {
            archive: PathBuf::from(archive),
            extracted: None,
        }
    }

    async fn extracted(&mut self, workdir: &Workdir) -> Result<PathBuf, AcquireError> {
        if let Some(path) = &self.extracted {
            return Ok(path.clone());
        }
        let path = extract_archive(workdir, &self.archive).await?;
        self.extracted = Some(path.clone());
        Ok(path)
    }

    pub async fn acquire_metadata(&mut self, workdir: &Workdir) -> Result<ImageMetadata, AcquireError> {
        let extracted = self.extracted(workdir).await?;
        let label = self.archive.display().to_string();
        let source = label.clone();
        workdir
            .run_blocking(&label, move || resolve_config(&extracted, &source))
            .await
    }

    pub async fn materialize_filesystem(
        &mut self,
        workdir: &Workdir,
        rootfs: &Path,
    ) -> Result<PathBuf, AcquireError> {
        let extracted = self.extracted(workdir).await?;
        let rootfs = rootfs.to_path_buf();
        workdir
            .run_blocking(&self.archive.display().to_string(), move || {
                root_from_extracted(&extracted, &rootfs)
            })
            .await
    }
}

/// Extracts `archive` into `<workdir>/archive` on a blocking task.
pub async fn extract_archive(workdir: &Workdir, archive: &Path) -> Result<PathBuf, AcquireError> {
    let dest = workdir.path().join("archive");
    let label = archive.display().to_string();
    let (source, target) = (archive.to_path_buf(), dest.clone());

    debug!(archive = %label, dest = %dest.display(), "Extracting archive");
    workdir
        .run_blocking(&label, move || archive::extract(&source, &target))
        .await?;
    Ok(dest)
}

/// Finds and parses the image config inside an extracted archive.
///
/// Top-level `.json` files other than `manifest.json`/`index.json` are
/// candidates, in sorted order. When there are several, the first is used
/// and an [`Diagnostic::AmbiguousConfig`] is recorded. Without candidates the
/// config named by `manifest.json` is used; failing that the metadata is
/// empty and a [`Diagnostic::MissingConfig`] is recorded.
pub fn resolve_config(extracted: &Path, source: &str) -> Result<ImageMetadata, AcquireError> {
    let candidates = config_candidates(extracted)?;

    let (config_path, diagnostic) = match candidates.as_slice() {
        [] => {
            let named = archive::read_saved_manifest(extracted)?
                .and_then(|manifest| manifest.config)
                .map(|config| extracted.join(config))
                .filter(|path| path.is_file());
            (named, None)
        }
        [only] => (Some(extracted.join(only)), None),
        [first, ..] => {
            warn!(
                source,
                chosen = %first,
                candidates = candidates.len(),
                "Found multiple config candidates, some diff results may be incorrect"
            );
            (
                Some(extracted.join(first)),
                Some(Diagnostic::AmbiguousConfig {
                    chosen: first.clone(),
                    candidates: candidates.clone(),
                }),
            )
        }
    };

    let Some(config_path) = config_path else {
        return Ok(ImageMetadata {
            diagnostics: vec![Diagnostic::MissingConfig {
                source: source.to_string(),
            }],
            ..Default::default()
        });
    };

    let label = config_path.display().to_string();
    let bytes = fs::read(&config_path).map_err(|e| AcquireError::io(&label, e))?;
    let mut metadata = ConfigBlob::parse(&bytes, &label)?.into_metadata();
    metadata.diagnostics.extend(diagnostic);
    Ok(metadata)
}

fn config_candidates(extracted: &Path) -> Result<Vec<String>, AcquireError> {
    let entries =
        fs::read_dir(extracted).map_err(|e| AcquireError::io(extracted.display().to_string(), e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AcquireError::io(extracted.display().to_string(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") && !EXCLUDED_CONFIGS.contains(&name.as_str()) && entry.path().is_file() {
            candidates.push(name);
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Builds the root filesystem from an extracted archive.
///
/// Saved images are unioned layer by layer into `rootfs`; anything else is
/// taken to be a root filesystem already.
pub fn root_from_extracted(extracted: &Path, rootfs: &Path) -> Result<PathBuf, AcquireError> {
    match archive::read_saved_manifest(extracted)? {
        Some(manifest) if !manifest.layers.is_empty() => {
            fs::create_dir_all(rootfs).map_err(|e| AcquireError::io(rootfs.display().to_string(), e))?;
            archive::union_layers(extracted, &manifest, rootfs)?;
            Ok(rootfs.to_path_buf())
        }
        _ => Ok(extracted.to_path_buf()),
    }
}
