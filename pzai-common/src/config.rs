//! Configuration loading and resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command-line and environment values arrive together as [`ConfigOverrides`]
//! (clap reads both). A missing TOML file is not an error.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "PZAI_CONFIG";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
const DATABASE_FILE_NAME: &str = "personalizeai.db";

/// Contents of the optional TOML config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    /// Allowed CORS origins; empty or `["*"]` allows any origin
    pub cors_origins: Vec<String>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub cors_origins: Vec<String>,
}

impl ServiceConfig {
    /// Merge overrides over the TOML file over compiled defaults
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Self {
        Self {
            host: overrides
                .host
                .or(toml.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            database_path: overrides
                .database_path
                .or(toml.database_path)
                .unwrap_or_else(default_database_path),
            cors_origins: toml.cors_origins,
        }
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when CORS should accept any origin
    pub fn cors_permissive(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Locate the TOML config file
///
/// Command-line path first, then `PZAI_CONFIG`, then the platform config
/// directory (`~/.config/pzai/config.toml` on Linux).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("pzai").join("config.toml"))
}

/// Load the TOML config file, using defaults when it does not exist
///
/// A file that exists but cannot be read or parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {} (using defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// Platform default database location
///
/// `~/.local/share/pzai/personalizeai.db` on Linux, falling back to the
/// working directory when no data directory is known.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pzai").join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = ServiceConfig::resolve(ConfigOverrides::default(), TomlConfig::default());
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_path.ends_with(DATABASE_FILE_NAME));
        assert!(config.cors_permissive());
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml = TomlConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some(9000),
            database_path: Some(PathBuf::from("/srv/toml.db")),
            cors_origins: vec!["https://app.example.com".to_string()],
        };
        let overrides = ConfigOverrides {
            host: None,
            port: Some(9100),
            database_path: Some(PathBuf::from("/tmp/cli.db")),
        };

        let config = ServiceConfig::resolve(overrides, toml);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.database_path, PathBuf::from("/tmp/cli.db"));
        assert_eq!(config.bind_addr(), "127.0.0.1:9100");
        assert!(!config.cors_permissive());
    }

    #[test]
    fn test_wildcard_origin_is_permissive() {
        let toml = TomlConfig {
            cors_origins: vec!["*".to_string()],
            ..Default::default()
        };
        let config = ServiceConfig::resolve(ConfigOverrides::default(), toml);
        assert!(config.cors_permissive());
    }

    #[test]
    fn test_cli_config_path_wins() {
        let path = PathBuf::from("/etc/pzai/custom.toml");
        assert_eq!(resolve_config_path(Some(&path)), Some(path));
    }
}
