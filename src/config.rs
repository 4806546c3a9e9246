//! Settings file loading.
//!
//! Settings are optional. They are read from the path given on the command
//! line, else from `$IDIFF_CONFIG`, else from `./idiff.toml` when it exists.
//! The format is detected by file extension (.toml, .yaml, .yml, .json). If
//! the extension is unknown or missing, TOML, YAML and JSON are tried in that
//! order.
//!
//! Command-line flags take precedence over anything set here.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::config::parse_settings;
//! use idiff_rs::differs::WalkDepth;
//!
//! let settings = parse_settings("differs = [\"hist\", \"pip\"]\ndepth = \"shallow\"\n", Some("toml"), "idiff.toml").unwrap();
//! assert_eq!(settings.differs, Some(vec!["hist".to_string(), "pip".to_string()]));
//! assert_eq!(settings.depth, Some(WalkDepth::Shallow));
//! ```

use crate::acquire::BackendPreference;
use crate::differs::WalkDepth;
use crate::error::ConfigError;
use crate::output::OutputFormat;
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "IDIFF_CONFIG";
/// Settings file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "idiff.toml";

/// Values that may be set in a settings file. Unset fields fall back to the
/// built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub differs: Option<Vec<String>>,
    pub format: Option<OutputFormat>,
    pub depth: Option<WalkDepth>,
    pub backend: Option<BackendPreference>,
    pub client_binary: Option<String>,
    pub timeout_secs: Option<u64>,
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub only: Vec<String>,
}

impl Settings {
    fn validate(self, path: &str) -> Result<Self, ConfigError> {
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: format!("timeout_secs in {}", path),
                value: "0".to_string(),
            });
        }
        if let Some(binary) = &self.client_binary {
            if binary.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("client_binary in {}", path),
                    value: binary.clone(),
                });
            }
        }
        Ok(self)
    }
}

/// Loads settings from `path`.
///
/// # Errors
///
/// - The file does not exist (`ConfigError::FileNotFound`)
/// - The file cannot be read (`ConfigError::ReadError`)
/// - The contents are invalid for the detected format
/// - The format cannot be determined (`ConfigError::UnknownFormat`)
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let label = path.to_string_lossy().to_string();
    if !path.exists() {
        return Err(ConfigError::file_not_found(label));
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(&label, e))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase());

    debug!(path = %label, "Loading settings");
    parse_settings(&content, extension.as_deref(), &label)
}

/// Parses settings content of the given format (by extension).
pub fn parse_settings(
    content: &str,
    extension: Option<&str>,
    path: &str,
) -> Result<Settings, ConfigError> {
    let settings = match extension {
        Some("toml") => toml::from_str(content).map_err(|source| ConfigError::TomlError {
            path: path.to_string(),
            source,
        })?,
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|source| ConfigError::YamlError {
                path: path.to_string(),
                source,
            })?
        }
        Some("json") => serde_json::from_str(content).map_err(|source| ConfigError::JsonError {
            path: path.to_string(),
            source,
        })?,
        _ => toml::from_str(content)
            .map_err(|_| ())
            .or_else(|_| serde_yaml::from_str(content).map_err(|_| ()))
            .or_else(|_| serde_json::from_str(content).map_err(|_| ()))
            .map_err(|_| ConfigError::unknown_format(path))?,
    };
    Settings::validate(settings, path)
}

/// Finds and loads the settings file, if any.
pub fn discover_settings(explicit: Option<&Path>) -> Result<Option<Settings>, ConfigError> {
    match settings_path(explicit, std::env::var_os(CONFIG_ENV), Path::new(DEFAULT_CONFIG_FILE)) {
        Some(path) => load_settings(&path).map(Some),
        None => Ok(None),
    }
}

/// Picks the settings file: explicit path, then the environment, then the
/// default file when it exists.
pub fn settings_path(
    explicit: Option<&Path>,
    from_env: Option<OsString>,
    default: &Path,
) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| from_env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or_else(|| default.is_file().then(|| default.to_path_buf()))
}
