//! Backend configuration.
//!
//! A small JSON file, every field optional. Load order: `PAPERSINK_CONFIG`,
//! then the user config dir (`.../papersink/backend.json`), then
//! `/etc/papersink/backend.json`, then built-in defaults.
//! `PAPERSINK_SPOOL`, `PAPERSINK_GS` and `PAPERSINK_GUI` override
//! individual fields so an installer or a test can redirect the backend
//! without writing a file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "PAPERSINK_CONFIG";
pub const SPOOL_ENV: &str = "PAPERSINK_SPOOL";
pub const GS_ENV: &str = "PAPERSINK_GS";
pub const GUI_ENV: &str = "PAPERSINK_GUI";

const DEFAULT_CONFIG_PATH: &str = "/etc/papersink/backend.json";
const DEFAULT_SPOOL_ROOT: &str = "/var/spool/papersink";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Root under which each user gets a private spool directory.
    pub spool_root: PathBuf,
    /// Command launched when no combiner instance is reachable.
    pub gui_command: String,
    /// External distiller used for PostScript payloads.
    pub gs_command: String,
    /// Upper bound on one conversion; past it the converter is killed and
    /// the failure reported as transient.
    pub convert_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            spool_root: PathBuf::from(DEFAULT_SPOOL_ROOT),
            gui_command: "papersink".to_string(),
            gs_command: "gs".to_string(),
            convert_timeout_secs: 120,
        }
    }
}

impl BackendConfig {
    /// Loads the effective configuration: file (if any) plus env overrides.
    pub fn resolve() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => load_config(&path)?,
            Err(_) => match Self::first_existing_config() {
                Some(path) => load_config(path)?,
                None => Self::default(),
            },
        };

        if let Ok(root) = std::env::var(SPOOL_ENV) {
            config.spool_root = PathBuf::from(root);
        }
        if let Ok(gs) = std::env::var(GS_ENV) {
            config.gs_command = gs;
        }
        if let Ok(gui) = std::env::var(GUI_ENV) {
            config.gui_command = gui;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// A per-user config (useful when the backend runs in a user session,
    /// e.g. under a test harness) shadows the system one.
    fn first_existing_config() -> Option<PathBuf> {
        let user_config = dirs::config_dir().map(|dir| dir.join("papersink").join("backend.json"));
        user_config
            .filter(|path| path.exists())
            .or_else(|| {
                let system = PathBuf::from(DEFAULT_CONFIG_PATH);
                system.exists().then_some(system)
            })
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BackendConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<BackendConfig, ConfigError> {
    let config: BackendConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &BackendConfig) -> Result<(), ConfigError> {
    if config.convert_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "convert_timeout_secs must be greater than zero".to_string(),
        });
    }
    if config.gui_command.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "gui_command must not be empty".to_string(),
        });
    }
    if config.gs_command.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "gs_command must not be empty".to_string(),
        });
    }
    if !config.spool_root.is_absolute() {
        return Err(ConfigError::Validation {
            message: format!(
                "spool_root must be an absolute path, got '{}'",
                config.spool_root.display()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.spool_root, PathBuf::from("/var/spool/papersink"));
        assert_eq!(config.gs_command, "gs");
        assert_eq!(config.convert_timeout_secs, 120);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = load_config_from_str(r#"{ "gs_command": "/opt/gs/bin/gs" }"#).unwrap();
        assert_eq!(config.gs_command, "/opt/gs/bin/gs");
        assert_eq!(config.gui_command, "papersink");
        assert_eq!(config.convert_timeout_secs, 120);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = load_config_from_str(r#"{ "convert_timeout_secs": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_relative_spool_root_rejected() {
        let err = load_config_from_str(r#"{ "spool_root": "spool" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }
}
