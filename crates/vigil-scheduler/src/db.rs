use rusqlite::Connection;

use crate::error::Result;

/// Initialise the local-job schema in `conn`.
///
/// Creates the `local_jobs` table (idempotent) and an index on `next_run` so
/// the polling query stays cheap.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL UNIQUE,
            expression  TEXT    NOT NULL,   -- cron-like, see schedule.rs
            status      TEXT    NOT NULL DEFAULT 'running',
            last_run    TEXT,               -- ISO-8601 or NULL
            next_run    TEXT,               -- ISO-8601 or NULL
            run_count   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE status = 'running' AND next_run <= ?
        CREATE INDEX IF NOT EXISTS idx_local_jobs_next_run ON local_jobs (next_run);
        ",
    )?;
    Ok(())
}
