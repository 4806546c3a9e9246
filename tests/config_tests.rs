use idiff_rs::config::{load_settings, parse_settings, Settings};
use idiff_rs::differs::WalkDepth;
use idiff_rs::error::ConfigError;
use idiff_rs::{BackendPreference, OutputFormat};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_toml_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idiff.toml");
    fs::write(
        &path,
        r#"
differs = ["hist", "pip", "node"]
format = "plain"
depth = "shallow"
backend = "cli"
client_binary = "podman"
timeout_secs = 120
scratch_dir = "/var/tmp/idiff"
ignore = ["/var/cache", "**/__pycache__"]
only = ["/usr/**"]
"#,
    )
    .unwrap();

    let settings = load_settings(&path).unwrap();
    assert_eq!(
        settings.differs,
        Some(vec!["hist".to_string(), "pip".to_string(), "node".to_string()])
    );
    assert_eq!(settings.format, Some(OutputFormat::Plain));
    assert_eq!(settings.depth, Some(WalkDepth::Shallow));
    assert_eq!(settings.backend, Some(BackendPreference::Cli));
    assert_eq!(settings.client_binary.as_deref(), Some("podman"));
    assert_eq!(settings.timeout_secs, Some(120));
    assert_eq!(settings.scratch_dir, Some(PathBuf::from("/var/tmp/idiff")));
    assert_eq!(settings.ignore.len(), 2);
    assert_eq!(settings.only, vec!["/usr/**"]);
}

#[test]
fn test_empty_file_is_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idiff.toml");
    fs::write(&path, "").unwrap();
    assert_eq!(load_settings(&path).unwrap(), Settings::default());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = load_settings(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn test_yml_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.yml");
    fs::write(&path, "format: yaml\ndepth: deep\n").unwrap();

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.format, Some(OutputFormat::Yaml));
    assert_eq!(settings.depth, Some(WalkDepth::Deep));
}

#[test]
fn test_invalid_json() {
    let err = parse_settings("{\"format\": ", Some("json"), "idiff.json").unwrap_err();
    assert!(matches!(err, ConfigError::JsonError { .. }));
}

#[test]
fn test_unknown_format_value() {
    let err = parse_settings("format = \"xml\"\n", Some("toml"), "idiff.toml").unwrap_err();
    assert!(matches!(err, ConfigError::TomlError { .. }));
}

#[test]
fn test_empty_client_binary_rejected() {
    let err = parse_settings("client_binary = \"  \"\n", Some("toml"), "idiff.toml").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
