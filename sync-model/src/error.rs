use thiserror::Error;

/// Error type for sync model operations
#[derive(Debug, Error)]
pub enum SyncModelError {
    /// Preferences cache error (rusqlite)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The SDK reported an adding state this client does not know
    #[error("Unknown sync adding state: {0}")]
    UnknownAddingState(i32),
    /// A cached sync identifier is not a UUID
    #[error("Invalid sync id: {0}")]
    InvalidSyncId(String),
}

pub type Result<T> = std::result::Result<T, SyncModelError>;
