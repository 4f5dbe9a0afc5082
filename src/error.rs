use sync_model::SyncModelError;
use thiserror::Error;

/// Central error types for the desktop client shell
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
    /// Sync registry or preferences cache error
    #[error("Sync model error: {0}")]
    Model(#[from] SyncModelError),
    /// Replay or manifest file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// User-friendly error messages
impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => format!("The configuration file is invalid: {}", e.message()),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check the data directory permissions.".to_string()
            }
            AppError::Model(_) => {
                "The sync preferences could not be read. Please try again.".to_string()
            }
            AppError::Json(e) => format!("A data file could not be read (line {}).", e.line()),
        }
    }
}
