use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, instrument};
use vigil_core::{CheckEvent, EventSource};

use crate::db::init_db;
use crate::error::{Result, StoreError};

/// Marker written whenever the operator changes the refresh interval.
pub const LAST_INTERVAL_RESET: &str = "last_interval_reset";
/// Marker written by the cancellation signal.
pub const CANCELLED_AT: &str = "cancelled_at";

/// A single-value timestamp marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub key: String,
    /// ms since epoch.
    pub value: i64,
    pub note: Option<String>,
    /// RFC3339 time of the last write.
    pub updated_at: String,
}

/// Bounded, append-only log of check events plus the marker table.
///
/// Appends from overlapping lineages need no coordination beyond the
/// connection mutex: events are independent and ordered by timestamp.
pub struct HistoryStore {
    db: Mutex<Connection>,
    limit: usize,
}

impl HistoryStore {
    /// Wrap a connection, creating tables if needed. At most `limit` events
    /// are retained; the oldest appended events are evicted first.
    pub fn new(conn: Connection, limit: usize) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            limit: limit.max(1),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Append an event and evict anything beyond the ring size.
    #[instrument(skip(self, event), fields(source = %event.source, cycle_id = %event.cycle_id))]
    pub fn append(&self, event: &CheckEvent) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO check_events
             (timestamp, source, cycle_id, lineage_id, interval_seconds, services_checked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                event.timestamp,
                event.source.as_str(),
                event.cycle_id,
                event.lineage_id,
                event.interval_seconds as i64,
                event.services_checked,
            ],
        )?;

        // Everything at or below the (limit + 1)-th newest row goes.
        let evicted = db.execute(
            "DELETE FROM check_events WHERE id <= (
                SELECT id FROM check_events ORDER BY id DESC LIMIT 1 OFFSET ?1
             )",
            [self.limit as i64],
        )?;
        if evicted > 0 {
            debug!(evicted, "history ring trimmed");
        }
        Ok(())
    }

    /// The `n` most recent events, newest first.
    #[instrument(skip(self))]
    pub fn recent(&self, n: usize) -> Result<Vec<CheckEvent>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT timestamp, source, cycle_id, lineage_id, interval_seconds, services_checked
             FROM check_events
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let events = stmt
            .query_map([n as i64], row_to_event)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(events)
    }

    /// Every retained event, newest first.
    pub fn all(&self) -> Result<Vec<CheckEvent>> {
        self.recent(self.limit)
    }

    /// The newest event credited to `source`, if any is retained.
    #[instrument(skip(self), fields(source = %source))]
    pub fn last_event_for(&self, source: EventSource) -> Result<Option<CheckEvent>> {
        let db = self.conn()?;
        let event = db
            .query_row(
                "SELECT timestamp, source, cycle_id, lineage_id, interval_seconds, services_checked
                 FROM check_events
                 WHERE source = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                [source.as_str()],
                row_to_event,
            )
            .optional()?
            .flatten();
        Ok(event)
    }

    /// Number of retained events.
    pub fn count(&self) -> Result<usize> {
        let db = self.conn()?;
        let n: i64 = db.query_row("SELECT COUNT(*) FROM check_events", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // --- markers -----------------------------------------------------------

    /// Upsert a timestamp marker.
    #[instrument(skip(self, note), fields(key = %key, value))]
    pub fn set_marker(&self, key: &str, value: i64, note: Option<&str>) -> Result<()> {
        let db = self.conn()?;
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO markers (key, value, note, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value, note = excluded.note, updated_at = excluded.updated_at",
            rusqlite::params![key, value, note, now],
        )?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    pub fn marker(&self, key: &str) -> Result<Option<Marker>> {
        let db = self.conn()?;
        let marker = db
            .query_row(
                "SELECT key, value, note, updated_at FROM markers WHERE key = ?1",
                [key],
                |row| {
                    Ok(Marker {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        note: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(marker)
    }

    /// Record that the refresh interval changed at `at` (ms).
    pub fn mark_interval_reset(&self, at: i64) -> Result<()> {
        self.set_marker(LAST_INTERVAL_RESET, at, None)
    }

    /// Timestamp of the last interval change; 0 when the interval was never changed.
    pub fn last_interval_reset(&self) -> Result<i64> {
        Ok(self.marker(LAST_INTERVAL_RESET)?.map_or(0, |m| m.value))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Map a row to an event. Rows with an unknown source are skipped (`None`).
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<CheckEvent>> {
    let source: String = row.get(1)?;
    let Ok(source) = source.parse::<EventSource>() else {
        return Ok(None);
    };
    Ok(Some(CheckEvent {
        timestamp: row.get(0)?,
        source,
        cycle_id: row.get(2)?,
        lineage_id: row.get(3)?,
        interval_seconds: row.get::<_, i64>(4)? as u64,
        services_checked: row.get(5)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(limit: usize) -> HistoryStore {
        HistoryStore::new(Connection::open_in_memory().unwrap(), limit).unwrap()
    }

    fn event(ts: i64, source: EventSource) -> CheckEvent {
        CheckEvent {
            timestamp: ts,
            source,
            cycle_id: format!("c-{ts}"),
            lineage_id: "l-1".to_string(),
            interval_seconds: 60,
            services_checked: 3,
        }
    }

    #[test]
    fn recent_is_newest_first() {
        let store = store(10);
        store.append(&event(1_000, EventSource::SelfTrigger)).unwrap();
        store.append(&event(3_000, EventSource::SelfTrigger)).unwrap();
        store.append(&event(2_000, EventSource::SelfTrigger)).unwrap();

        let ts: Vec<i64> = store.recent(10).unwrap().iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![3_000, 2_000, 1_000]);
    }

    #[test]
    fn ring_evicts_oldest_appended() {
        let store = store(3);
        for ts in 1..=5 {
            store.append(&event(ts * 1_000, EventSource::SelfTrigger)).unwrap();
        }
        assert_eq!(store.count().unwrap(), 3);
        let ts: Vec<i64> = store.all().unwrap().iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![5_000, 4_000, 3_000]);
    }

    #[test]
    fn last_event_for_filters_by_source() {
        let store = store(10);
        store.append(&event(1_000, EventSource::SelfTrigger)).unwrap();
        store.append(&event(2_000, EventSource::LocalJob)).unwrap();
        store.append(&event(3_000, EventSource::SelfTrigger)).unwrap();

        let last = store.last_event_for(EventSource::LocalJob).unwrap().unwrap();
        assert_eq!(last.timestamp, 2_000);
        assert!(store.last_event_for(EventSource::CiScheduler).unwrap().is_none());
    }

    #[test]
    fn events_round_trip_all_fields() {
        let store = store(10);
        let original = event(42_000, EventSource::Manual);
        store.append(&original).unwrap();
        assert_eq!(store.recent(1).unwrap(), vec![original]);
    }

    #[test]
    fn markers_upsert() {
        let store = store(10);
        assert_eq!(store.last_interval_reset().unwrap(), 0);
        store.mark_interval_reset(1_000).unwrap();
        store.mark_interval_reset(2_000).unwrap();
        assert_eq!(store.last_interval_reset().unwrap(), 2_000);

        store.set_marker(CANCELLED_AT, 5_000, Some("operator")).unwrap();
        let marker = store.marker(CANCELLED_AT).unwrap().unwrap();
        assert_eq!(marker.value, 5_000);
        assert_eq!(marker.note.as_deref(), Some("operator"));
    }
}
