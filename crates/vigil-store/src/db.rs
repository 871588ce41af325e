use rusqlite::Connection;

use crate::error::Result;

/// Initialise the history, marker and settings tables.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS check_events (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp         INTEGER NOT NULL,   -- ms since epoch
            source            TEXT    NOT NULL,
            cycle_id          TEXT    NOT NULL,
            lineage_id        TEXT    NOT NULL,
            interval_seconds  INTEGER NOT NULL,
            services_checked  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_check_events_ts
            ON check_events (timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_check_events_source
            ON check_events (source, timestamp DESC);

        -- Single-value markers: last_interval_reset, cancelled_at.
        CREATE TABLE IF NOT EXISTS markers (
            key         TEXT    NOT NULL PRIMARY KEY,
            value       INTEGER NOT NULL,
            note        TEXT,
            updated_at  TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT NOT NULL PRIMARY KEY,
            value       TEXT NOT NULL,   -- JSON
            updated_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
