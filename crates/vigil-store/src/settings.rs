use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, instrument};
use vigil_core::SchedulerConfig;

use crate::db::init_db;
use crate::error::{Result, StoreError};

const SCHEDULER_CONFIG_KEY: &str = "scheduler_config";

/// Holds the operator-owned `SchedulerConfig` as a JSON settings row.
///
/// Reads always hit the database; nothing is cached, so an update made by
/// another connection is visible to the next reader.
pub struct SettingsStore {
    db: Mutex<Connection>,
}

impl SettingsStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Write `seed` only if no config is stored yet, then return the stored value.
    #[instrument(skip(self, seed))]
    pub fn seed_scheduler_config(&self, seed: &SchedulerConfig) -> Result<SchedulerConfig> {
        {
            let db = self.conn()?;
            let n = db.execute(
                "INSERT OR IGNORE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    SCHEDULER_CONFIG_KEY,
                    serde_json::to_string(seed)?,
                    chrono::Utc::now().to_rfc3339()
                ],
            )?;
            if n > 0 {
                info!(
                    refresh_interval_ms = seed.refresh_interval_ms,
                    "scheduler config seeded"
                );
            }
        }
        self.scheduler_config()
    }

    /// The stored config. Errors with `NotFound` before the first seed.
    #[instrument(skip(self))]
    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let db = self.conn()?;
        let raw: Option<String> = db
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [SCHEDULER_CONFIG_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| StoreError::NotFound {
            key: SCHEDULER_CONFIG_KEY.to_string(),
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Replace the stored config, returning the previous value if there was one.
    #[instrument(skip(self, config), fields(refresh_interval_ms = config.refresh_interval_ms))]
    pub fn put_scheduler_config(&self, config: &SchedulerConfig) -> Result<Option<SchedulerConfig>> {
        let previous = match self.scheduler_config() {
            Ok(c) => Some(c),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let db = self.conn()?;
        db.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![
                SCHEDULER_CONFIG_KEY,
                serde_json::to_string(config)?,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        info!(
            refresh_interval_ms = config.refresh_interval_ms,
            ci_enabled = config.ci_schedule.enabled,
            "scheduler config updated"
        );
        Ok(previous)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}
