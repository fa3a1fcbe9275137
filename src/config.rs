//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXSTORE_CONFIG` (environment variable)
//! 2. `~/.config/mboxstore/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxstore\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Import tuning.
    pub import: ImportConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Import tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows per transaction (default: 500).
    pub batch_size: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB);
    /// larger messages are truncated with a warning.
    pub max_message_size: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::store::writer::DEFAULT_BATCH_SIZE,
            max_message_size: 256 * 1024 * 1024,
        }
    }
}

/// Path of the config file, honoring `$MBOXSTORE_CONFIG`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MBOXSTORE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("mboxstore").join("config.toml"))
}

/// Load the configuration, falling back to defaults when the file is
/// missing or malformed (a broken config file should not block an import).
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.import.batch_size, 500);
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str("[import]\nbatch_size = 50\n").unwrap();
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.import.max_message_size, 256 * 1024 * 1024);
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config: Config = toml::from_str("[general]\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config.general.log_level, "warn");
    }
}
