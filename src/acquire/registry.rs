//! Registry backend.
//!
//! Pulls an image straight from a registry with `oci-distribution`, without
//! a local daemon. The manifest and config blob are fetched first (multi
//! platform indexes resolve to the host platform); layers are then
//! downloaded in manifest order and unioned into the root filesystem.
//!
//! ## Limits
//!
//! - Reference length is capped at [`MAX_IMAGE_REF_LEN`] and restricted to a
//!   character allowlist before parsing.
//! - At most [`MAX_LAYERS`] layers, each at most [`MAX_LAYER_SIZE`] bytes.

use super::Workdir;
use crate::archive;
use crate::error::AcquireError;
use crate::image::{ConfigBlob, ImageMetadata};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MAX_IMAGE_REF_LEN: usize = 512;
pub const MAX_LAYERS: usize = 128;
pub const MAX_LAYER_SIZE: u64 = 512 * 1024 * 1024;

/// Pulled manifest plus the raw config blob.
#[derive(Clone)]
struct Pulled {
    manifest: OciImageManifest,
    config: String,
}

pub struct RegistryBackend {
    reference: Reference,
    client: Client,
    auth: RegistryAuth,
    pulled: Option<Pulled>,
}

impl RegistryBackend {
    /// Validates and parses `image_ref`. No network traffic happens here.
    pub fn new(image_ref: &str) -> Result<Self, AcquireError> {
        let reference = validate_reference(image_ref)?;
        Ok(Self {
            reference,
            client: Client::new(ClientConfig {
                protocol: ClientProtocol::Https,
                ..Default::default()
            }),
            auth: RegistryAuth::Anonymous,
            pulled: None,
        })
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    async fn pull(&mut self) -> Result<Pulled, AcquireError> {
        if let Some(pulled) = &self.pulled {
            return Ok(pulled.clone());
        }

        info!(reference = %self.reference, "Pulling manifest");
        let (manifest, digest, config) = self
            .client
            .pull_manifest_and_config(&self.reference, &self.auth)
            .await
            .map_err(|e| AcquireError::registry(self.reference.to_string(), e))?;
        debug!(reference = %self.reference, %digest, layers = manifest.layers.len(), "Resolved manifest");

        check_layers(&self.reference.to_string(), &manifest.layers)?;

        let pulled = Pulled { manifest, config };
        self.pulled = Some(pulled.clone());
        Ok(pulled)
    }

    pub async fn acquire_metadata(&mut self) -> Result<ImageMetadata, AcquireError> {
        let pulled = self.pull().await?;
        let origin = format!("config blob of {}", self.reference);
        Ok(ConfigBlob::parse(pulled.config.as_bytes(), &origin)?.into_metadata())
    }

    pub async fn materialize_filesystem(
        &mut self,
        workdir: &Workdir,
        rootfs: &Path,
    ) -> Result<PathBuf, AcquireError> {
        let pulled = self.pull().await?;
        std::fs::create_dir_all(rootfs)
            .map_err(|e| AcquireError::io(rootfs.display().to_string(), e))?;

        for layer in pulled.manifest.layers {
            debug!(digest = %layer.digest, size = layer.size, "Pulling layer");
            let mut data = Vec::new();
            self.client
                .pull_blob(&self.reference, &layer, &mut data)
                .await
                .map_err(|e| AcquireError::registry(self.reference.to_string(), e))?;

            let target = rootfs.to_path_buf();
            let label = layer.digest.clone();
            workdir
                .run_blocking(&layer.digest, move || {
                    archive::apply_layer(&data[..], &target, &label)
                })
                .await?;
        }

        Ok(rootfs.to_path_buf())
    }
}

/// Length, character allowlist and format checks on an image reference.
pub fn validate_reference(image_ref: &str) -> Result<Reference, AcquireError> {
    if image_ref.len() > MAX_IMAGE_REF_LEN {
        return Err(AcquireError::registry(
            image_ref,
            format!("reference exceeds {} bytes", MAX_IMAGE_REF_LEN),
        ));
    }

    if !image_ref
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '-' | '_' | '@'))
    {
        return Err(AcquireError::registry(image_ref, "contains invalid characters"));
    }

    image_ref
        .parse()
        .map_err(|e| AcquireError::registry(image_ref, e))
}

/// Rejects manifests that exceed the layer limits or use zstd layers.
fn check_layers(reference: &str, layers: &[OciDescriptor]) -> Result<(), AcquireError> {
    if layers.len() > MAX_LAYERS {
        return Err(AcquireError::registry(
            reference,
            format!("too many layers: {} > {}", layers.len(), MAX_LAYERS),
        ));
    }

    for layer in layers {
        if layer.media_type.contains("zstd") {
            return Err(AcquireError::UnsupportedLayer {
                reference: reference.to_string(),
                media_type: layer.media_type.clone(),
            });
        }
        if layer.size < 0 || layer.size as u64 > MAX_LAYER_SIZE {
            return Err(AcquireError::registry(
                reference,
                format!(
                    "layer {} is {} bytes, limit is {}",
                    layer.digest, layer.size, MAX_LAYER_SIZE
                ),
            ));
        }
    }
    Ok(())
}
