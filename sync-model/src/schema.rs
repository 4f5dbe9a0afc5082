use rusqlite::{Connection, Result};

/// Initialize the preferences cache schema
pub fn init_sync_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM sync_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_sync_schema_v1(conn)?;
        conn.execute("INSERT INTO sync_schema_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create preferences cache schema version 1
fn create_sync_schema_v1(conn: &Connection) -> Result<()> {
    // Table: sync_settings - client-side copy of every configured sync
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_settings (
            tag INTEGER PRIMARY KEY,
            sync_id TEXT NOT NULL DEFAULT '',
            local_folder TEXT NOT NULL,
            mega_folder TEXT NOT NULL DEFAULT '',
            mega_handle INTEGER NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL DEFAULT 1 CHECK(enabled IN (0,1)),
            active INTEGER NOT NULL DEFAULT 0 CHECK(active IN (0,1)),
            error INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS update_sync_settings_timestamp
         AFTER UPDATE ON sync_settings
         BEGIN
            UPDATE sync_settings SET updated_at = CURRENT_TIMESTAMP WHERE tag = NEW.tag;
         END",
        [],
    )?;

    // Table: disabled_sync_tags - syncs disabled without user action
    conn.execute(
        "CREATE TABLE IF NOT EXISTS disabled_sync_tags (
            tag INTEGER PRIMARY KEY
        )",
        [],
    )?;

    // Table: preference_flags - install-wide one-time flags
    conn.execute(
        "CREATE TABLE IF NOT EXISTS preference_flags (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0 CHECK(value IN (0,1))
        )",
        [],
    )?;

    Ok(())
}
