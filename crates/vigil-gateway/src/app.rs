use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use vigil_core::config::{DispatchMode, VigilConfig};
use vigil_core::{now_ms, CycleLineage, EventSource};
use vigil_cycle::{
    CheckExecutor, CycleController, CycleSettings, Dispatcher, HttpCheckExecutor, HttpDispatcher,
    LocalDispatcher,
};
use vigil_monitor::SourceReconciler;
use vigil_scheduler::{LocalJob, SchedulerEngine, SchedulerHandle};
use vigil_store::{HistoryStore, SettingsStore};

use crate::probe::ProbeRunner;

/// Name of the job mirrored from `localJobSchedule`.
pub const DEFAULT_JOB_NAME: &str = "default";

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: VigilConfig,
    pub history: Arc<HistoryStore>,
    pub settings: Arc<SettingsStore>,
    pub jobs: SchedulerHandle,
    pub controller: Arc<CycleController>,
    pub probes: Arc<ProbeRunner>,
    pub reconciler: SourceReconciler,
    pub started_at: i64,
}

/// Everything `main` needs: the shared state plus the background pieces
/// that have not been spawned yet.
pub struct Gateway {
    pub state: Arc<AppState>,
    engine: SchedulerEngine,
    fired_rx: mpsc::Receiver<LocalJob>,
    local_rx: Option<mpsc::UnboundedReceiver<CycleLineage>>,
}

impl Gateway {
    /// Open the database, run migrations and wire every subsystem.
    pub fn open(config: VigilConfig) -> anyhow::Result<Self> {
        let db_path = config.database.path.clone();
        ensure_parent_dir(&db_path);
        info!(path = %db_path, "opening SQLite database");

        let db = Connection::open(&db_path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        vigil_store::db::init_db(&db)?;
        vigil_scheduler::db::init_db(&db)?;
        info!("database migrations complete");

        // each subsystem gets its own connection
        let history = Arc::new(HistoryStore::new(
            Connection::open(&db_path)?,
            config.history.limit,
        )?);
        let settings = Arc::new(SettingsStore::new(Connection::open(&db_path)?)?);
        let scheduler_config = settings.seed_scheduler_config(&config.scheduler)?;

        let jobs = SchedulerHandle::new(Connection::open(&db_path)?)?;
        if scheduler_config.local_job_schedule.enabled {
            jobs.ensure_job(DEFAULT_JOB_NAME, &scheduler_config.local_job_schedule.expression)?;
        }
        let (fired_tx, fired_rx) = mpsc::channel::<LocalJob>(64);
        let engine = SchedulerEngine::new(Connection::open(&db_path)?, fired_tx)?;

        let probes = Arc::new(ProbeRunner::new(config.services.clone(), Arc::clone(&settings))?);

        let cycle_settings = CycleSettings::from_config(&config.cycle);
        let ceiling = Duration::from_secs(config.cycle.invocation_ceiling_secs);
        let (dispatcher, executor, local_rx): (
            Arc<dyn Dispatcher>,
            Arc<dyn CheckExecutor>,
            Option<mpsc::UnboundedReceiver<CycleLineage>>,
        ) = match config.cycle.dispatch {
            DispatchMode::Http => {
                let base_url = config.gateway.base_url();
                let dispatcher: Arc<dyn Dispatcher> = Arc::new(HttpDispatcher::new(
                    base_url.clone(),
                    Duration::from_millis(config.cycle.dispatch_ack_ms),
                    // the callee sleeps up to the ceiling before it answers
                    ceiling + Duration::from_secs(60),
                )?);
                let executor: Arc<dyn CheckExecutor> =
                    Arc::new(HttpCheckExecutor::new(base_url, ceiling)?);
                (dispatcher, executor, None)
            }
            DispatchMode::Local => {
                let (dispatcher, rx) = LocalDispatcher::channel();
                let dispatcher: Arc<dyn Dispatcher> = Arc::new(dispatcher);
                let executor: Arc<dyn CheckExecutor> = probes.clone();
                (dispatcher, executor, Some(rx))
            }
        };
        info!(mode = ?config.cycle.dispatch, "cycle dispatch configured");

        let controller = Arc::new(CycleController::new(
            executor,
            settings.clone(),
            Arc::clone(&history),
            dispatcher,
            cycle_settings,
        ));

        let state = Arc::new(AppState {
            config,
            history,
            settings,
            jobs,
            controller,
            probes,
            reconciler: SourceReconciler::default(),
            started_at: now_ms(),
        });

        Ok(Self {
            state,
            engine,
            fired_rx,
            local_rx,
        })
    }

    /// Spawn the job engine, the local-job delivery task, the local cycle
    /// pump (local dispatch only) and the watchdog.
    pub fn spawn_background(self, shutdown: watch::Receiver<bool>) -> Arc<AppState> {
        let Gateway {
            state,
            engine,
            mut fired_rx,
            local_rx,
        } = self;

        let engine_shutdown = shutdown.clone();
        tokio::spawn(async move { engine.run(engine_shutdown).await });

        // Fired local jobs run a single-shot check credited to `local-job`.
        let delivery_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(job) = fired_rx.recv().await {
                let controller = Arc::clone(&delivery_state.controller);
                tokio::spawn(async move {
                    match controller.start(EventSource::LocalJob).await {
                        Ok(outcome) => {
                            info!(job = %job.name, status = ?outcome.status, "local job check finished")
                        }
                        Err(e) => warn!(job = %job.name, error = %e, "local job check failed"),
                    }
                });
            }
        });

        if let Some(rx) = local_rx {
            tokio::spawn(Arc::clone(&state.controller).drive(rx));
        }

        if state.config.watchdog.enabled {
            tokio::spawn(crate::watchdog::run(Arc::clone(&state), shutdown));
        }

        state
    }
}

/// Kick off the first lineage once the listener is accepting connections.
pub fn spawn_autostart(state: &Arc<AppState>) {
    let controller = Arc::clone(&state.controller);
    tokio::spawn(async move {
        match controller.start(EventSource::SelfTrigger).await {
            Ok(outcome) => info!(
                cycle_id = %outcome.cycle_id,
                status = ?outcome.status,
                "initial cycle started"
            ),
            Err(e) => error!(error = %e, "initial cycle failed"),
        }
    });
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http;

    Router::new()
        .route("/health", get(http::health::health_handler))
        .route("/ping-cycle", get(http::ping_cycle::ping_cycle_handler))
        .route(
            "/scheduler-control",
            get(http::scheduler_control::scheduler_control_handler),
        )
        .route("/check-runner", get(http::check_runner::check_runner_handler))
        .route("/ping-stats", get(http::ping_stats::ping_stats_handler))
        .route(
            "/scheduler-config",
            get(http::scheduler_config::get_config).post(http::scheduler_config::update_config),
        )
        .route(
            "/local-jobs",
            get(http::local_jobs::list_jobs).post(http::local_jobs::add_job),
        )
        .route(
            "/local-jobs/{id}",
            axum::routing::delete(http::local_jobs::remove_job),
        )
        .route("/local-jobs/{id}/start", post(http::local_jobs::start_job))
        .route("/local-jobs/{id}/stop", post(http::local_jobs::stop_job))
        .route("/monitor", get(http::monitor::monitor_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
