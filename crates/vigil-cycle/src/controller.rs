use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_core::config::CycleConfig;
use vigil_core::{now_ms, CheckEvent, CycleKind, CycleLineage, EventSource};
use vigil_store::HistoryStore;

use crate::cancel::CancellationSignal;
use crate::config::ConfigSource;
use crate::dispatch::Dispatcher;
use crate::error::{CycleError, Result};
use crate::executor::CheckExecutor;

/// Working time kept back from the invocation ceiling for the check itself.
const CHECK_MARGIN_SECS: u64 = 30;
/// Shortest delay ever handed to a continuation.
const MIN_DELAY_MS: u64 = 1_000;

/// Timing knobs for the controller.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Delay carried by recovery and backup continuations.
    pub recovery_delay_ms: u64,
    /// Interval used when an initial cycle cannot read the scheduler config.
    pub fallback_interval_ms: u64,
    /// Longest single sleep; longer delays are split into hops.
    pub max_sleep: Duration,
}

impl CycleSettings {
    pub fn from_config(config: &CycleConfig) -> Self {
        let budget = config
            .invocation_ceiling_secs
            .saturating_sub(CHECK_MARGIN_SECS)
            .max(1);
        Self {
            recovery_delay_ms: config.recovery_delay_ms,
            fallback_interval_ms: config.fallback_interval_ms,
            max_sleep: Duration::from_secs(budget),
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&CycleConfig::default())
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Checked and handed off a normal continuation.
    Success,
    /// Checked, but only the backup continuation could be dispatched.
    PartialSuccess,
    /// Checked, and neither continuation could be dispatched. The chain ends here.
    DispatchFailed,
    /// Something failed before the hand-off; a recovery continuation is scheduled.
    CycleError,
    /// The lineage was cancelled; nothing checked, nothing scheduled.
    Cancelled,
    /// The delay outlasted one invocation; the remainder was handed on unchecked.
    Hopped,
    /// Single-shot check for an external source; no chain involved.
    Checked,
}

/// Response body of one cycle invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    pub status: CycleStatus,
    /// Delay (ms) carried by whatever was dispatched next, if anything.
    pub next_ping_in: Option<u64>,
    pub cycle_id: String,
    pub lineage_id: String,
    pub kind: CycleKind,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cycle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleOutcome {
    fn new(lineage: &CycleLineage, status: CycleStatus) -> Self {
        Self {
            status,
            next_ping_in: None,
            cycle_id: lineage.cycle_id.clone(),
            lineage_id: lineage.lineage_id.clone(),
            kind: lineage.kind,
            timestamp: now_ms(),
            next_cycle_id: None,
            error: None,
        }
    }

    fn handed_to(mut self, next: &CycleLineage) -> Self {
        self.next_ping_in = Some(next.delay_ms);
        self.next_cycle_id = Some(next.cycle_id.clone());
        self
    }

    fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// An invocation currently sleeping or checking in this process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlight {
    pub cycle_id: String,
    pub lineage_id: String,
    pub kind: CycleKind,
    pub source: EventSource,
    pub entered_at: i64,
    /// When the initial sleep ends, for kinds that sleep.
    pub wakes_at: Option<i64>,
}

struct InFlightGuard<'a> {
    table: &'a DashMap<String, InFlight>,
    cycle_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.cycle_id);
    }
}

/// The self-continuing scheduling engine.
///
/// Each call to [`run_cycle`](Self::run_cycle) is one bounded invocation:
/// an optional sleep, a cancellation check, one check round, a fresh config
/// read and a fire-and-forget hand-off of the successor.
pub struct CycleController {
    executor: Arc<dyn CheckExecutor>,
    config: Arc<dyn ConfigSource>,
    history: Arc<HistoryStore>,
    dispatcher: Arc<dyn Dispatcher>,
    cancel: CancellationSignal,
    settings: CycleSettings,
    in_flight: DashMap<String, InFlight>,
}

impl CycleController {
    pub fn new(
        executor: Arc<dyn CheckExecutor>,
        config: Arc<dyn ConfigSource>,
        history: Arc<HistoryStore>,
        dispatcher: Arc<dyn Dispatcher>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            executor,
            config,
            cancel: CancellationSignal::new(Arc::clone(&history)),
            history,
            dispatcher,
            settings,
            in_flight: DashMap::new(),
        }
    }

    pub fn cancel_signal(&self) -> &CancellationSignal {
        &self.cancel
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Invocations currently inside `run_cycle`, oldest first.
    pub fn in_flight(&self) -> Vec<InFlight> {
        let mut list: Vec<InFlight> = self.in_flight.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|f| f.entered_at);
        list
    }

    /// Bootstrap or operator entry point.
    ///
    /// Sources that own a chain cancel every outstanding lineage and run a
    /// fresh initial cycle. External schedulers get a single check.
    pub async fn start(&self, source: EventSource) -> Result<CycleOutcome> {
        if !source.starts_chain() {
            return self.check_once(source).await;
        }
        let cancelled_at = self.cancel.cancel("initial cycle")?;
        let lineage = CycleLineage::initial(cancelled_at + 1);
        info!(
            lineage_id = %lineage.lineage_id,
            %source,
            "starting new cycle lineage"
        );
        self.run_cycle_as(lineage, source).await
    }

    /// One invocation of a self-trigger chain.
    pub async fn run_cycle(&self, lineage: CycleLineage) -> Result<CycleOutcome> {
        self.run_cycle_as(lineage, EventSource::SelfTrigger).await
    }

    /// Like [`run_cycle`](Self::run_cycle) with the check event credited to `source`.
    ///
    /// Only fails when a recovery continuation could not be dispatched; every
    /// other failure is folded into the returned status.
    pub async fn run_cycle_as(
        &self,
        lineage: CycleLineage,
        source: EventSource,
    ) -> Result<CycleOutcome> {
        let entered_at = now_ms();
        let wakes_at = lineage.kind.sleeps_first().then(|| {
            let sleep_ms = lineage
                .delay_ms
                .min(self.settings.max_sleep.as_millis() as u64);
            entered_at + sleep_ms as i64
        });
        self.in_flight.insert(
            lineage.cycle_id.clone(),
            InFlight {
                cycle_id: lineage.cycle_id.clone(),
                lineage_id: lineage.lineage_id.clone(),
                kind: lineage.kind,
                source,
                entered_at,
                wakes_at,
            },
        );
        let _guard = InFlightGuard {
            table: &self.in_flight,
            cycle_id: lineage.cycle_id.clone(),
        };

        debug!(
            cycle_id = %lineage.cycle_id,
            lineage_id = %lineage.lineage_id,
            kind = %lineage.kind,
            delay_ms = lineage.delay_ms,
            "cycle invoked"
        );

        if lineage.kind.sleeps_first() {
            let delay = Duration::from_millis(lineage.delay_ms);
            if delay > self.settings.max_sleep {
                return self.hop(&lineage).await;
            }
            tokio::time::sleep(delay).await;
        }

        match self.cancel.is_cancelled(lineage.started_at) {
            Ok(true) => {
                info!(
                    cycle_id = %lineage.cycle_id,
                    lineage_id = %lineage.lineage_id,
                    "lineage cancelled, not continuing"
                );
                return Ok(CycleOutcome::new(&lineage, CycleStatus::Cancelled));
            }
            Ok(false) => {}
            Err(e) => return self.recover(&lineage, e).await,
        }

        let delay = match self.check_and_record(&lineage, source).await {
            Ok(_) => self.next_delay(&lineage),
            Err(e) => Err(e),
        };
        match delay {
            Ok(delay_ms) => self.continue_with(&lineage, delay_ms).await,
            Err(e) => self.recover(&lineage, e).await,
        }
    }

    /// One check credited to an external scheduler. Never dispatches.
    pub async fn check_once(&self, source: EventSource) -> Result<CycleOutcome> {
        let lineage = CycleLineage::initial(now_ms());
        match self.check_and_record(&lineage, source).await {
            Ok(_) => Ok(CycleOutcome::new(&lineage, CycleStatus::Checked)),
            Err(e) => {
                warn!(%source, error = %e, "single-shot check failed");
                Ok(CycleOutcome::new(&lineage, CycleStatus::CycleError).with_error(e))
            }
        }
    }

    /// Hand a brand-new lineage of `kind` to the dispatcher without cancelling
    /// anything. Used by the watchdog to revive a dead chain.
    pub async fn spawn_lineage(&self, kind: CycleKind, delay_ms: u64) -> Result<CycleLineage> {
        let lineage = CycleLineage::fresh(kind, delay_ms, self.cancel.fresh_start()?);
        self.dispatcher.dispatch(&lineage).await?;
        info!(
            lineage_id = %lineage.lineage_id,
            kind = %kind,
            delay_ms,
            "spawned cycle lineage"
        );
        Ok(lineage)
    }

    /// Run every lineage arriving on `rx` in its own task. Pairs with
    /// [`LocalDispatcher`](crate::LocalDispatcher).
    pub async fn drive(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<CycleLineage>) {
        while let Some(lineage) = rx.recv().await {
            let controller = Arc::clone(&self);
            tokio::spawn(async move {
                let cycle_id = lineage.cycle_id.clone();
                match controller.run_cycle(lineage).await {
                    Ok(outcome) => {
                        debug!(%cycle_id, status = ?outcome.status, "local cycle finished")
                    }
                    Err(e) => error!(%cycle_id, error = %e, "local cycle failed"),
                }
            });
        }
        debug!("local cycle pump stopped");
    }

    async fn hop(&self, lineage: &CycleLineage) -> Result<CycleOutcome> {
        let budget = self.settings.max_sleep;
        tokio::time::sleep(budget).await;

        match self.cancel.is_cancelled(lineage.started_at) {
            Ok(true) => return Ok(CycleOutcome::new(lineage, CycleStatus::Cancelled)),
            Ok(false) => {}
            Err(e) => return self.recover(lineage, e).await,
        }

        let remaining = lineage.delay_ms.saturating_sub(budget.as_millis() as u64);
        let next = lineage.next(lineage.kind, remaining);
        match self.dispatcher.dispatch(&next).await {
            Ok(()) => {
                debug!(
                    cycle_id = %lineage.cycle_id,
                    next_cycle_id = %next.cycle_id,
                    remaining_ms = remaining,
                    "delay exceeds invocation budget, hopped"
                );
                Ok(CycleOutcome::new(lineage, CycleStatus::Hopped).handed_to(&next))
            }
            Err(e) => Ok(self.backup(lineage, e).await),
        }
    }

    async fn check_and_record(
        &self,
        lineage: &CycleLineage,
        source: EventSource,
    ) -> Result<CheckEvent> {
        let outcome = self.executor.run_check(&lineage.cycle_id).await?;
        let event = CheckEvent {
            timestamp: now_ms(),
            source,
            cycle_id: lineage.cycle_id.clone(),
            lineage_id: lineage.lineage_id.clone(),
            interval_seconds: outcome.refresh_interval / 1000,
            services_checked: outcome.services_checked,
        };
        self.history.append(&event)?;
        info!(
            cycle_id = %event.cycle_id,
            %source,
            services = event.services_checked,
            interval_seconds = event.interval_seconds,
            "check recorded"
        );
        Ok(event)
    }

    /// Delay for the successor, from the config as it is right now.
    fn next_delay(&self, lineage: &CycleLineage) -> Result<u64> {
        let delay = match self.config.scheduler_config() {
            Ok(config) => config.refresh_interval_ms,
            Err(e) if lineage.kind == CycleKind::Initial => {
                warn!(
                    cycle_id = %lineage.cycle_id,
                    error = %e,
                    fallback_ms = self.settings.fallback_interval_ms,
                    "scheduler config unavailable, using fallback interval"
                );
                self.settings.fallback_interval_ms
            }
            Err(e) => return Err(e),
        };
        Ok(delay.max(MIN_DELAY_MS))
    }

    async fn continue_with(&self, lineage: &CycleLineage, delay_ms: u64) -> Result<CycleOutcome> {
        let next = lineage.next(CycleKind::Continuation, delay_ms);
        match self.dispatcher.dispatch(&next).await {
            Ok(()) => {
                info!(
                    cycle_id = %lineage.cycle_id,
                    next_cycle_id = %next.cycle_id,
                    delay_ms,
                    "continuation scheduled"
                );
                Ok(CycleOutcome::new(lineage, CycleStatus::Success).handed_to(&next))
            }
            Err(e) => Ok(self.backup(lineage, e).await),
        }
    }

    async fn backup(&self, lineage: &CycleLineage, cause: CycleError) -> CycleOutcome {
        warn!(
            cycle_id = %lineage.cycle_id,
            error = %cause,
            "continuation dispatch failed, trying backup"
        );
        let next = lineage.next(CycleKind::Backup, self.settings.recovery_delay_ms);
        match self.dispatcher.dispatch(&next).await {
            Ok(()) => CycleOutcome::new(lineage, CycleStatus::PartialSuccess)
                .handed_to(&next)
                .with_error(cause),
            Err(e) => {
                error!(
                    cycle_id = %lineage.cycle_id,
                    lineage_id = %lineage.lineage_id,
                    error = %e,
                    "backup dispatch failed, lineage ends here"
                );
                CycleOutcome::new(lineage, CycleStatus::DispatchFailed).with_error(e)
            }
        }
    }

    async fn recover(&self, lineage: &CycleLineage, cause: CycleError) -> Result<CycleOutcome> {
        warn!(
            cycle_id = %lineage.cycle_id,
            kind = %lineage.kind,
            error = %cause,
            "cycle failed, scheduling recovery"
        );
        let next = lineage.next(CycleKind::Recovery, self.settings.recovery_delay_ms);
        match self.dispatcher.dispatch(&next).await {
            Ok(()) => Ok(CycleOutcome::new(lineage, CycleStatus::CycleError)
                .handed_to(&next)
                .with_error(cause)),
            Err(e) => Err(CycleError::RecoveryDispatch {
                cycle_id: lineage.cycle_id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
