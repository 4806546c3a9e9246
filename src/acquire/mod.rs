//! Image acquisition: turning a source string into an [`Image`].
//!
//! The source is classified once (see [`crate::source`]) and handed to the
//! matching [`Backend`] variant. Every backend produces the same
//! [`ImageMetadata`] shape and an extracted root filesystem, so differs never
//! need to know where an image came from.
//!
//! Each acquisition extracts into a fresh, uniquely named temporary
//! directory. That directory is removed on every failure path, including
//! timeout and cancellation, which makes retrying an acquisition safe.

pub mod daemon;
pub mod registry;
pub mod tarball;

pub use daemon::{DaemonBackend, DaemonClient};
pub use registry::RegistryBackend;
pub use tarball::TarBackend;

use crate::error::AcquireError;
use crate::image::{Image, ImageMetadata};
use crate::source::{classify, SourceKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{info, warn};

/// Default upper bound for acquiring a single image.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(600);

/// Which local-daemon backend the caller would like to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Native daemon API, falling back to the CLI client if incompatible.
    #[default]
    Api,
    /// Always shell out to the CLI client.
    Cli,
}

#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub backend: BackendPreference,
    /// CLI client used by the shell-out backend (`docker`, `podman`, ...).
    pub client_binary: String,
    pub timeout: Duration,
    /// Parent of the per-acquisition scratch directories; the system temp
    /// dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Api,
            client_binary: "docker".to_string(),
            timeout: DEFAULT_ACQUIRE_TIMEOUT,
            scratch_dir: None,
        }
    }
}

/// Scratch directory for one acquisition.
///
/// Blocking extraction tasks hold a clone, so the directory is only removed
/// once the last task using it has finished.
#[derive(Debug, Clone)]
pub struct Workdir(Arc<TempDir>);

impl Workdir {
    pub fn create(parent: Option<&Path>) -> Result<Self, AcquireError> {
        let parent = parent.map_or_else(std::env::temp_dir, Path::to_path_buf);
        tempfile::Builder::new()
            .prefix("idiff-")
            .tempdir_in(&parent)
            .map(|dir| Self(Arc::new(dir)))
            .map_err(|e| AcquireError::io(parent.display().to_string(), e))
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Runs blocking filesystem work off the async executor.
    pub async fn run_blocking<T, F>(&self, label: &str, work: F) -> Result<T, AcquireError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AcquireError> + Send + 'static,
    {
        let guard = self.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        })
        .await
        .map_err(|e| AcquireError::extraction(label, e))?
    }
}

/// The acquisition backends. Exactly one is selected per source.
pub enum Backend {
    Daemon(DaemonBackend),
    Registry(RegistryBackend),
    Tar(TarBackend),
}

impl Backend {
    /// Classifies `source` and constructs the matching backend.
    ///
    /// For local ids this probes the daemon once; the outcome is fixed for the
    /// lifetime of the backend.
    pub async fn resolve(source: &str, options: &AcquireOptions) -> Result<Self, AcquireError> {
        Ok(match classify(source)? {
            SourceKind::LocalId => Backend::Daemon(DaemonBackend::connect(source, options).await),
            SourceKind::Registry => Backend::Registry(RegistryBackend::new(source)?),
            SourceKind::Tar => Backend::Tar(TarBackend::new(source)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Daemon(backend) => backend.client().name(),
            Backend::Registry(_) => "registry",
            Backend::Tar(_) => "tar",
        }
    }

    pub async fn acquire_metadata(&mut self, workdir: &Workdir) -> Result<ImageMetadata, AcquireError> {
        match self {
            Backend::Daemon(backend) => backend.acquire_metadata().await,
            Backend::Registry(backend) => backend.acquire_metadata().await,
            Backend::Tar(backend) => backend.acquire_metadata(workdir).await,
        }
    }

    /// Builds the image's root filesystem under `workdir` and returns its path.
    pub async fn materialize_filesystem(
        &mut self,
        workdir: &Workdir,
        rootfs: &Path,
    ) -> Result<PathBuf, AcquireError> {
        match self {
            Backend::Daemon(backend) => backend.materialize_filesystem(workdir, rootfs).await,
            Backend::Registry(backend) => backend.materialize_filesystem(workdir, rootfs).await,
            Backend::Tar(backend) => backend.materialize_filesystem(workdir, rootfs).await,
        }
    }
}

/// Acquires the image named by `source`, bounded by `options.timeout`.
pub async fn acquire(source: &str, options: &AcquireOptions) -> Result<Image, AcquireError> {
    tokio::time::timeout(options.timeout, acquire_unbounded(source, options))
        .await
        .map_err(|_| AcquireError::Timeout {
            reference: source.to_string(),
            duration: options.timeout,
        })?
}

async fn acquire_unbounded(source: &str, options: &AcquireOptions) -> Result<Image, AcquireError> {
    let mut backend = Backend::resolve(source, options).await?;
    let workdir = Workdir::create(options.scratch_dir.as_deref())?;
    let rootfs = workdir.path().join("rootfs");

    info!(source, backend = backend.name(), "Starting prep for image");
    let metadata = backend.acquire_metadata(&workdir).await?;
    let fs_path = backend.materialize_filesystem(&workdir, &rootfs).await?;

    for diagnostic in &metadata.diagnostics {
        warn!(source, %diagnostic, "Image diagnostic");
    }
    info!(source, layers = metadata.layers.len(), "Finished prepping image");

    Ok(Image::owned(source, workdir, fs_path, metadata))
}
