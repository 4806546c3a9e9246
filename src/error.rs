//! Custom error types for idiff.

use std::time::Duration;

/// Failures while turning an image reference into a normalized [`Image`].
///
/// Both images of a request are mandatory, so any of these aborts the whole
/// comparison.
///
/// [`Image`]: crate::image::Image
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Could not determine image source for {reference}")]
    UnresolvedSource { reference: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract {archive}: {reason}")]
    Extraction { archive: String, reason: String },

    #[error("Path traversal detected in {archive}: {path}")]
    PathTraversal { archive: String, path: String },

    #[error("Invalid image config in {origin}: {source}")]
    InvalidConfig {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Docker daemon request for {image} failed: {reason}")]
    Daemon { image: String, reason: String },

    #[error("Client command `{command}` failed: {reason}")]
    ClientCommand { command: String, reason: String },

    #[error("Registry request for {reference} failed: {reason}")]
    Registry { reference: String, reason: String },

    #[error("Unsupported layer media type {media_type} in {reference}")]
    UnsupportedLayer {
        reference: String,
        media_type: String,
    },

    #[error("Acquiring {reference} timed out after {duration:?}")]
    Timeout {
        reference: String,
        duration: Duration,
    },
}

/// Failure of a single differ. Never fatal for the request as a whole.
#[derive(Debug, thiserror::Error)]
pub enum DifferError {
    #[error("Filesystem root {path} does not exist")]
    MissingRoot { path: String },

    #[error("Expected a directory at {path}")]
    NotADirectory { path: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Differ {kind} panicked")]
    Panicked { kind: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Unknown output format: {format}")]
    UnknownFormat { format: String },

    #[error("Failed to serialize to JSON: {source}")]
    JsonSerializationError {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize to YAML: {source}")]
    YamlSerializationError {
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors loading a settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read settings file {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    TomlError {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not detect settings format for {path}")]
    UnknownFormat { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IdiffError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No diff results were produced{}", describe_no_results(.failures, .skipped))]
    NoResults {
        failures: Vec<String>,
        skipped: Vec<String>,
    },

    #[error("Diff task failed: {0}")]
    TaskFailed(String),
}

fn describe_no_results(failures: &[String], skipped: &[String]) -> String {
    let mut parts = Vec::new();
    if !failures.is_empty() {
        parts.push(format!("failed: {}", failures.join("; ")));
    }
    if !skipped.is_empty() {
        parts.push(format!("unknown differs: {}", skipped.join(", ")));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join("; "))
    }
}

impl AcquireError {
    pub fn unresolved(reference: impl Into<String>) -> Self {
        Self::UnresolvedSource {
            reference: reference.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(archive: impl Into<String>, reason: impl ToString) -> Self {
        Self::Extraction {
            archive: archive.into(),
            reason: reason.to_string(),
        }
    }

    pub fn registry(reference: impl Into<String>, reason: impl ToString) -> Self {
        Self::Registry {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub fn daemon(image: impl Into<String>, reason: impl ToString) -> Self {
        Self::Daemon {
            image: image.into(),
            reason: reason.to_string(),
        }
    }
}

impl DifferError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }
}

impl ConfigError {
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub fn unknown_format(path: impl Into<String>) -> Self {
        Self::UnknownFormat { path: path.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_source_display() {
        let err = AcquireError::unresolved("not an image");
        assert_eq!(
            err.to_string(),
            "Could not determine image source for not an image"
        );
    }

    #[test]
    fn test_no_results_lists_failures_and_skips() {
        let err = IdiffError::NoResults {
            failures: vec!["file: Filesystem root /x does not exist".to_string()],
            skipped: vec!["foo".to_string()],
        };
        let message = err.to_string();
        assert!(message.starts_with("No diff results were produced"));
        assert!(message.contains("/x does not exist"));
        assert!(message.contains("unknown differs: foo"));
    }

    #[test]
    fn test_no_results_without_detail() {
        let err = IdiffError::NoResults {
            failures: vec![],
            skipped: vec![],
        };
        assert_eq!(err.to_string(), "No diff results were produced");
    }

    #[test]
    fn test_idiff_error_from_acquire_error() {
        let err: IdiffError = AcquireError::unresolved("x").into();
        assert!(matches!(err, IdiffError::Acquire(_)));
    }
}
