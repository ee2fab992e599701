//! Tests for config file discovery and loading
//!
//! Tests that manipulate PZAI_CONFIG are marked #[serial] so they do not
//! race each other.

use pzai_common::config::{load_toml_config, resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_toml_config(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_config_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
host = "127.0.0.1"
port = 8123
database_path = "/var/lib/pzai/test.db"
cors_origins = ["https://dashboard.example.com"]
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(config.port, Some(8123));
    assert_eq!(config.database_path, Some(PathBuf::from("/var/lib/pzai/test.db")));
    assert_eq!(config.cors_origins, vec!["https://dashboard.example.com".to_string()]);
}

#[test]
fn test_partial_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = 9001\n").unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.port, Some(9001));
    assert!(config.host.is_none());
    assert!(config.cors_origins.is_empty());
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"\n").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, pzai_common::Error::Config(_)));
}

#[test]
#[serial]
fn test_env_var_config_path() {
    env::set_var(CONFIG_ENV_VAR, "/opt/pzai/config.toml");
    let resolved = resolve_config_path(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(PathBuf::from("/opt/pzai/config.toml")));
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/opt/pzai/config.toml");
    let cli = PathBuf::from("/home/user/pzai.toml");
    let resolved = resolve_config_path(Some(&cli));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(cli));
}

#[test]
#[serial]
fn test_default_config_path_without_env() {
    env::remove_var(CONFIG_ENV_VAR);
    if let Some(path) = resolve_config_path(None) {
        assert!(path.ends_with("pzai/config.toml"));
    }
}
