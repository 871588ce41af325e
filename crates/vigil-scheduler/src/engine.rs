use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::{compute_next_run, cron_interval_secs},
    types::{JobStatus, LocalJob},
};

const JOB_COLUMNS: &str = "id, name, expression, status, last_run, next_run,
                           run_count, created_at, updated_at";

/// Shared handle for job management (list/add/start/stop/remove) while the
/// engine loop runs.
///
/// Uses its own `Connection` so HTTP handlers can manage jobs without
/// conflicting with the engine's polling queries.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Add a running job. The expression must be a supported cron shape.
    pub fn add_job(&self, name: &str, expression: &str) -> Result<LocalJob> {
        let conn = self.lock()?;
        let job = insert_job(&conn, name, expression)?;
        info!(job_id = %job.id, %name, %expression, "local job added");
        Ok(job)
    }

    /// Create `name` if missing, otherwise update its expression; either way
    /// the job ends up running.
    pub fn ensure_job(&self, name: &str, expression: &str) -> Result<LocalJob> {
        let conn = self.lock()?;
        let existing: Option<String> = conn
            .query_row("SELECT id FROM local_jobs WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        match existing {
            None => insert_job(&conn, name, expression),
            Some(id) => {
                validate_expression(expression)?;
                conn.execute(
                    "UPDATE local_jobs SET expression = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![expression, ts(Utc::now()), id],
                )?;
                set_status(&conn, &id, JobStatus::Running)
            }
        }
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM local_jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "local job removed");
        Ok(())
    }

    /// Resume a job; its next run is computed from now.
    pub fn start_job(&self, id: &str) -> Result<LocalJob> {
        let conn = self.lock()?;
        let job = set_status(&conn, id, JobStatus::Running)?;
        info!(job_id = %id, next_run = ?job.next_run, "local job started");
        Ok(job)
    }

    /// Pause a job; it stays listed but never fires.
    pub fn stop_job(&self, id: &str) -> Result<LocalJob> {
        let conn = self.lock()?;
        let job = set_status(&conn, id, JobStatus::Stopped)?;
        info!(job_id = %id, "local job stopped");
        Ok(job)
    }

    pub fn list_jobs(&self) -> Result<Vec<LocalJob>> {
        let conn = self.lock()?;
        list_jobs(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::Poisoned)
    }
}

/// Core runner: persists jobs to SQLite and fires them at ±1 s precision.
pub struct SchedulerEngine {
    conn: Connection,
    /// Fired jobs are sent here; the receiver runs the actual check.
    fired_tx: mpsc::Sender<LocalJob>,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    ///
    /// The sender is non-blocking (`try_send`) so the tick loop is never stalled.
    pub fn new(conn: Connection, fired_tx: mpsc::Sender<LocalJob>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, fired_tx })
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("local job engine started");
        self.reschedule_overdue_on_startup();

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        error!("local job tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("local job engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    // --- private helpers ---------------------------------------------------

    /// Running jobs whose window passed while the process was down are pushed
    /// to their next slot instead of firing in a burst.
    fn reschedule_overdue_on_startup(&mut self) {
        let now = Utc::now();
        let overdue = match self.due_jobs(now) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("overdue-on-startup query failed: {e}");
                return;
            }
        };
        for job in &overdue {
            let next = ts(compute_next_run(&job.expression, now));
            if let Err(e) = self.conn.execute(
                "UPDATE local_jobs SET next_run = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![next, ts(now), job.id],
            ) {
                error!(job_id = %job.id, "failed to reschedule overdue job: {e}");
            }
        }
        if !overdue.is_empty() {
            warn!(count = overdue.len(), "overdue local jobs rescheduled on startup");
        }
    }

    fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<LocalJob>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM local_jobs
             WHERE status = 'running' AND next_run IS NOT NULL AND next_run <= ?1"
        ))?;
        let jobs = stmt
            .query_map([ts(now)], row_to_job)?
            .filter_map(|r| r.ok().flatten())
            .collect();
        Ok(jobs)
    }

    /// Fire all jobs whose next_run has arrived.
    fn tick(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let now_str = ts(now);
        let due = self.due_jobs(now)?;
        let fired = due.len();

        for mut job in due {
            let next = ts(compute_next_run(&job.expression, now));
            let run_count = job.run_count + 1;

            info!(job_id = %job.id, name = %job.name, run = run_count, %next, "firing local job");

            self.conn.execute(
                "UPDATE local_jobs SET last_run = ?1, next_run = ?2, run_count = ?3, updated_at = ?1
                 WHERE id = ?4",
                rusqlite::params![now_str, next, run_count, job.id],
            )?;

            job.last_run = Some(now_str.clone());
            job.next_run = Some(next);
            job.run_count = run_count;
            job.updated_at = now_str.clone();

            // try_send never blocks the tick loop; log a warning if the channel is full.
            if self.fired_tx.try_send(job).is_err() {
                warn!("local job channel full or closed, fire dropped");
            }
        }
        Ok(fired)
    }
}

// --- shared row helpers -----------------------------------------------------

/// Fixed-width UTC timestamp so lexicographic order equals time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn validate_expression(expression: &str) -> Result<()> {
    cron_interval_secs(expression)
        .map(|_| ())
        .ok_or_else(|| SchedulerError::InvalidSchedule(expression.to_string()))
}

fn insert_job(conn: &Connection, name: &str, expression: &str) -> Result<LocalJob> {
    validate_expression(expression)?;
    let now = Utc::now();
    let now_str = ts(now);
    let next = ts(compute_next_run(expression, now));
    let id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO local_jobs
         (id, name, expression, status, last_run, next_run, run_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'running', NULL, ?4, 0, ?5, ?5)",
        rusqlite::params![id, name, expression, next, now_str],
    )?;

    Ok(LocalJob {
        id,
        name: name.to_string(),
        expression: expression.to_string(),
        status: JobStatus::Running,
        last_run: None,
        next_run: Some(next),
        run_count: 0,
        created_at: now_str.clone(),
        updated_at: now_str,
    })
}

fn set_status(conn: &Connection, id: &str, status: JobStatus) -> Result<LocalJob> {
    let job = get_job(conn, id)?;
    let now = Utc::now();
    let next = match status {
        JobStatus::Running => Some(ts(compute_next_run(&job.expression, now))),
        JobStatus::Stopped => None,
    };
    conn.execute(
        "UPDATE local_jobs SET status = ?1, next_run = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![status.to_string(), next, ts(now), id],
    )?;
    get_job(conn, id)
}

fn get_job(conn: &Connection, id: &str) -> Result<LocalJob> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM local_jobs WHERE id = ?1"),
        [id],
        row_to_job,
    )
    .optional()?
    .flatten()
    .ok_or_else(|| SchedulerError::JobNotFound { id: id.to_string() })
}

fn list_jobs(conn: &Connection) -> Result<Vec<LocalJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM local_jobs ORDER BY created_at, name"
    ))?;
    let jobs = stmt
        .query_map([], row_to_job)?
        .filter_map(|r| r.ok().flatten())
        .collect();
    Ok(jobs)
}

/// Rows with an unknown status are skipped (`None`).
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<LocalJob>> {
    let status: String = row.get(3)?;
    let Ok(status) = status.parse::<JobStatus>() else {
        return Ok(None);
    };
    Ok(Some(LocalJob {
        id: row.get(0)?,
        name: row.get(1)?,
        expression: row.get(2)?,
        status,
        last_run: row.get(4)?,
        next_run: row.get(5)?,
        run_count: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> SchedulerHandle {
        SchedulerHandle::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn add_and_list() {
        let h = handle();
        let job = h.add_job("every-5", "*/5 * * * *").unwrap();
        assert!(job.is_running());
        assert_eq!(job.interval_secs(), 300);

        let jobs = h.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);
    }

    #[test]
    fn unsupported_expression_is_rejected() {
        let h = handle();
        assert!(matches!(
            h.add_job("hourly", "0 * * * *"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn oversized_step_is_rejected_and_handle_stays_usable() {
        let h = handle();
        assert!(matches!(
            h.add_job("huge", "*/200000000000000000 * * * *"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(matches!(
            h.ensure_job("default", "*/4611686018427387904 * * * *"),
            Err(SchedulerError::InvalidSchedule(_))
        ));
        assert!(h.list_jobs().unwrap().is_empty());
        h.add_job("ok", "*/5 * * * *").unwrap();
    }

    #[test]
    fn stop_clears_next_run_and_start_restores_it() {
        let h = handle();
        let job = h.add_job("j", "* * * * *").unwrap();

        let stopped = h.stop_job(&job.id).unwrap();
        assert_eq!(stopped.status, JobStatus::Stopped);
        assert!(stopped.next_run.is_none());

        let started = h.start_job(&job.id).unwrap();
        assert!(started.is_running());
        assert!(started.next_run.is_some());
    }

    #[test]
    fn ensure_job_updates_existing() {
        let h = handle();
        let first = h.ensure_job("default", "*/5 * * * *").unwrap();
        h.stop_job(&first.id).unwrap();

        let second = h.ensure_job("default", "*/10 * * * *").unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.expression, "*/10 * * * *");
        assert!(second.is_running());
        assert_eq!(h.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn remove_missing_job_errors() {
        assert!(matches!(
            handle().remove_job("nope"),
            Err(SchedulerError::JobNotFound { .. })
        ));
    }

    #[test]
    fn tick_fires_due_running_jobs_only() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut engine = SchedulerEngine::new(Connection::open_in_memory().unwrap(), tx).unwrap();
        let due = insert_job(&engine.conn, "due", "* * * * *").unwrap();
        let stopped = insert_job(&engine.conn, "stopped", "* * * * *").unwrap();
        set_status(&engine.conn, &stopped.id, JobStatus::Stopped).unwrap();

        // Two minutes ahead: the running job is due, the stopped one never is.
        let later = Utc::now() + chrono::Duration::minutes(2);
        assert_eq!(engine.tick(later).unwrap(), 1);

        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.id, due.id);
        assert_eq!(fired.run_count, 1);
        assert!(rx.try_recv().is_err());

        // Rescheduled past `later`, so an immediate second tick is a no-op.
        assert_eq!(engine.tick(later).unwrap(), 0);
    }
}
