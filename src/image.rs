//! Normalized image representation shared by every differ.

use crate::acquire::Workdir;
use crate::error::AcquireError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Non-fatal findings recorded while acquiring an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// More than one config candidate was found; `chosen` was used.
    AmbiguousConfig {
        chosen: String,
        candidates: Vec<String>,
    },
    /// No config could be located; history and env are empty.
    MissingConfig { source: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::AmbiguousConfig { chosen, candidates } => write!(
                f,
                "multiple config candidates ({}), using {}; some diff results may be incorrect",
                candidates.join(", "),
                chosen
            ),
            Diagnostic::MissingConfig { source } => {
                write!(f, "no image config found in {}", source)
            }
        }
    }
}

/// Metadata every backend produces, independent of how it was obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub env: Vec<String>,
    pub history: Vec<String>,
    pub layers: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// An acquired image: an extracted root filesystem plus its build metadata.
///
/// Read-only once constructed. When the image was acquired into a temporary
/// directory, that directory is owned here and removed when the image is
/// dropped.
#[derive(Debug)]
pub struct Image {
    source: String,
    fs_path: PathBuf,
    env: Vec<String>,
    history: Vec<String>,
    layers: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    _workdir: Option<Workdir>,
}

impl Image {
    /// Wraps an existing directory. Nothing is removed on drop.
    pub fn new(source: impl Into<String>, fs_path: impl Into<PathBuf>, metadata: ImageMetadata) -> Self {
        Self {
            source: source.into(),
            fs_path: fs_path.into(),
            env: metadata.env,
            history: metadata.history,
            layers: metadata.layers,
            diagnostics: metadata.diagnostics,
            _workdir: None,
        }
    }

    pub(crate) fn owned(
        source: impl Into<String>,
        workdir: Workdir,
        fs_path: PathBuf,
        metadata: ImageMetadata,
    ) -> Self {
        Self {
            _workdir: Some(workdir),
            ..Self::new(source, fs_path, metadata)
        }
    }

    /// The reference the image was acquired from, used as its display name.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Path {
        &self.fs_path
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Build history, oldest step first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Looks up `name` in the image environment.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| *key == name)
                .map(|(_, value)| value)
        })
    }
}

/// The subset of an image config blob idiff reads.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigBlob {
    #[serde(default)]
    config: Option<ContainerConfig>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    rootfs: Option<RootFs>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    created_by: String,
}

#[derive(Debug, Default, Deserialize)]
struct RootFs {
    #[serde(default)]
    diff_ids: Vec<String>,
}

impl ConfigBlob {
    pub fn parse(bytes: &[u8], origin: &str) -> Result<Self, AcquireError> {
        serde_json::from_slice(bytes).map_err(|source| AcquireError::InvalidConfig {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn into_metadata(self) -> ImageMetadata {
        ImageMetadata {
            env: self.config.and_then(|c| c.env).unwrap_or_default(),
            history: self
                .history
                .into_iter()
                .map(|entry| entry.created_by.trim().to_string())
                .collect(),
            layers: self.rootfs.map(|r| r.diff_ids).unwrap_or_default(),
            diagnostics: Vec::new(),
        }
    }
}
