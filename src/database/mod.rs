use crate::config::AppConfig;
use crate::error::AppError;
use sync_model::SqlitePreferences;

/// Opens the preferences cache, creating the data directory if needed
pub fn open_preferences(config: &AppConfig) -> Result<SqlitePreferences, AppError> {
    let db_path = config.database_path();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    log::debug!("Opening preferences cache at {}", db_path.display());
    let prefs = SqlitePreferences::open(&db_path)?;

    if let Some(disabled) = config.left_pane_icons_disabled {
        prefs.set_left_pane_icons_disabled(disabled)?;
    }

    Ok(prefs)
}
