use crate::error::Result;
use crate::models::{validate_sync_id, SyncSetting};
use crate::schema::init_sync_schema;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Warnings and hints that are shown at most once per installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OneTimeAction {
    FatWarning,
    HgfsWarning,
}

impl OneTimeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OneTimeAction::FatWarning => "fat_warning_shown",
            OneTimeAction::HgfsWarning => "hgfs_warning_shown",
        }
    }
}

const FIRST_SYNC_DONE: &str = "first_sync_done";
const LEFT_PANE_ICONS_DISABLED: &str = "left_pane_icons_disabled";

/// Persistent cache of sync settings and one-time flags
///
/// The registry writes through this on every observed state change, so
/// implementations must be cheap and synchronous.
pub trait Preferences: Send + Sync {
    /// Whether a user session is active
    fn logged(&self) -> bool;

    fn load_sync_setting(&self, tag: i32) -> Result<Option<SyncSetting>>;
    fn load_sync_settings(&self) -> Result<Vec<SyncSetting>>;
    fn write_sync_setting(&self, setting: &SyncSetting) -> Result<()>;
    fn remove_sync_setting(&self, setting: &SyncSetting) -> Result<()>;
    fn remove_all_sync_settings(&self) -> Result<()>;

    fn disabled_sync_tags(&self) -> Result<HashSet<i32>>;
    fn set_disabled_sync_tags(&self, tags: &HashSet<i32>) -> Result<()>;

    fn is_first_sync_done(&self) -> Result<bool>;
    fn set_first_sync_done(&self) -> Result<()>;
    fn is_one_time_action_done(&self, action: OneTimeAction) -> Result<bool>;
    fn set_one_time_action_done(&self, action: OneTimeAction, done: bool) -> Result<()>;

    fn left_pane_icons_disabled(&self) -> Result<bool>;
}

/// SQLite-backed preferences cache
pub struct SqlitePreferences {
    conn: Mutex<Connection>,
    logged: AtomicBool,
}

impl SqlitePreferences {
    /// Opens (and if needed creates) the cache at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_sync_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            logged: AtomicBool::new(false),
        })
    }

    /// Marks the start or end of a user session
    pub fn set_logged(&self, logged: bool) {
        self.logged.store(logged, Ordering::SeqCst);
    }

    pub fn set_left_pane_icons_disabled(&self, disabled: bool) -> Result<()> {
        self.set_flag(LEFT_PANE_ICONS_DISABLED, disabled)
    }

    fn flag(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let value: Option<bool> = conn
            .query_row(
                "SELECT value FROM preference_flags WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(false))
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO preference_flags (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Session-scoped writes are dropped while nobody is logged in
    fn session_write_allowed(&self, what: &str) -> bool {
        if self.logged() {
            true
        } else {
            log::debug!("Not logged in, skipping write of {}", what);
            false
        }
    }
}

fn setting_from_row(row: &Row) -> rusqlite::Result<SyncSetting> {
    let mega_handle: i64 = row.get(4)?;
    let error: i32 = row.get(8)?;
    Ok(SyncSetting {
        tag: row.get(0)?,
        sync_id: row.get(1)?,
        local_folder: row.get(2)?,
        mega_folder: row.get(3)?,
        mega_handle: mega_handle as u64,
        name: row.get(5)?,
        enabled: row.get(6)?,
        active: row.get(7)?,
        error: error.into(),
    })
}

const SELECT_SETTINGS: &str = "SELECT tag, sync_id, local_folder, mega_folder, mega_handle, name, enabled, active, error
     FROM sync_settings";

impl Preferences for SqlitePreferences {
    fn logged(&self) -> bool {
        self.logged.load(Ordering::SeqCst)
    }

    fn load_sync_setting(&self, tag: i32) -> Result<Option<SyncSetting>> {
        let conn = self.conn.lock();
        let setting = conn
            .query_row(
                &format!("{} WHERE tag = ?1", SELECT_SETTINGS),
                params![tag],
                setting_from_row,
            )
            .optional()?;

        if let Some(setting) = &setting {
            validate_sync_id(&setting.sync_id)?;
        }
        Ok(setting)
    }

    fn load_sync_settings(&self) -> Result<Vec<SyncSetting>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at, tag", SELECT_SETTINGS))?;
        let rows = stmt.query_map([], setting_from_row)?;
        let settings = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        for setting in &settings {
            validate_sync_id(&setting.sync_id)?;
        }
        Ok(settings)
    }

    fn write_sync_setting(&self, setting: &SyncSetting) -> Result<()> {
        if !self.session_write_allowed("sync setting") {
            return Ok(());
        }

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_settings (tag, sync_id, local_folder, mega_folder, mega_handle, name, enabled, active, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(tag) DO UPDATE SET
                sync_id = excluded.sync_id,
                local_folder = excluded.local_folder,
                mega_folder = excluded.mega_folder,
                mega_handle = excluded.mega_handle,
                name = excluded.name,
                enabled = excluded.enabled,
                active = excluded.active,
                error = excluded.error",
            params![
                setting.tag,
                &setting.sync_id,
                &setting.local_folder,
                &setting.mega_folder,
                setting.mega_handle as i64,
                &setting.name,
                setting.enabled,
                setting.active,
                setting.error.code(),
            ],
        )?;
        Ok(())
    }

    fn remove_sync_setting(&self, setting: &SyncSetting) -> Result<()> {
        if !self.session_write_allowed("sync setting removal") {
            return Ok(());
        }

        let conn = self.conn.lock();
        conn.execute("DELETE FROM sync_settings WHERE tag = ?1", params![setting.tag])?;
        Ok(())
    }

    fn remove_all_sync_settings(&self) -> Result<()> {
        if !self.session_write_allowed("sync settings removal") {
            return Ok(());
        }

        let conn = self.conn.lock();
        conn.execute("DELETE FROM sync_settings", [])?;
        Ok(())
    }

    fn disabled_sync_tags(&self) -> Result<HashSet<i32>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT tag FROM disabled_sync_tags")?;
        let rows = stmt.query_map([], |row| row.get::<_, i32>(0))?;
        Ok(rows.collect::<rusqlite::Result<HashSet<_>>>()?)
    }

    fn set_disabled_sync_tags(&self, tags: &HashSet<i32>) -> Result<()> {
        if !self.session_write_allowed("disabled sync tags") {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM disabled_sync_tags", [])?;
        for tag in tags {
            tx.execute("INSERT INTO disabled_sync_tags (tag) VALUES (?1)", params![tag])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn is_first_sync_done(&self) -> Result<bool> {
        self.flag(FIRST_SYNC_DONE)
    }

    fn set_first_sync_done(&self) -> Result<()> {
        self.set_flag(FIRST_SYNC_DONE, true)
    }

    fn is_one_time_action_done(&self, action: OneTimeAction) -> Result<bool> {
        self.flag(action.as_str())
    }

    fn set_one_time_action_done(&self, action: OneTimeAction, done: bool) -> Result<()> {
        self.set_flag(action.as_str(), done)
    }

    fn left_pane_icons_disabled(&self) -> Result<bool> {
        self.flag(LEFT_PANE_ICONS_DISABLED)
    }
}
