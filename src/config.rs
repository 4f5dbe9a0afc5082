use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "MEGASYNC_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "megasync.toml";

/// Client configuration, read from `megasync.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for the preferences cache and integration files
    pub data_dir: PathBuf,
    pub database_file: String,
    /// Default log filter, `RUST_LOG` takes precedence
    pub log_level: String,
    /// Client version that ran before this one (e.g. 3001 for 3.0.1)
    pub previous_version: Option<u32>,
    pub left_pane_icons_disabled: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: "megasync.db".to_string(),
            log_level: "info".to_string(),
            previous_version: None,
            left_pane_icons_disabled: None,
        }
    }
}

impl AppConfig {
    #[allow(dead_code)]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Loads the config file, falling back to defaults when it does not exist
    pub fn load() -> Result<Self, AppError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
