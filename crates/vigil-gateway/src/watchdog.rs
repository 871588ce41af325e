//! Re-bootstraps a dead self-trigger chain.
//!
//! Every `poll_secs` the self-trigger source is graded against the configured
//! interval. Past the critical threshold a recovery lineage is spawned, at
//! most `max_attempts` times in a row; the count resets once the source is
//! healthy or merely late again.
//!
//! A cancel newer than the last self-trigger event means an operator stopped
//! the chain; the watchdog leaves it stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vigil_core::{now_ms, CycleKind, EventSource};
use vigil_monitor::{classify, Escalation, Health, RetryEscalation};

use crate::app::AppState;

pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let config = state.config.watchdog.clone();
    info!(poll_secs = config.poll_secs, max_attempts = config.max_attempts, "watchdog started");

    let mut escalation = RetryEscalation::new(config.max_attempts);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // the first tick completes immediately; give the autostart a head start
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poll(&state, &mut escalation).await {
                    warn!(error = %e, "watchdog poll failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("watchdog shutting down");
                    break;
                }
            }
        }
    }
}

/// One observation. Returns the health seen and what was done about it.
pub async fn poll(
    state: &AppState,
    escalation: &mut RetryEscalation,
) -> anyhow::Result<(Health, Escalation)> {
    let config = state.settings.scheduler_config()?;
    let last = state.history.last_event_for(EventSource::SelfTrigger)?;
    let seconds_ago = last.as_ref().map(|e| ((now_ms() - e.timestamp).max(0) / 1000) as u64);
    let health = classify(seconds_ago, config.interval_seconds());

    let cancelled_at = state.controller.cancel_signal().cancelled_at()?;
    let last_at = last.as_ref().map_or(0, |e| e.timestamp);
    if cancelled_at.is_some_and(|at| at > last_at) {
        debug!(?cancelled_at, last_at, "chain cancelled by operator, not reviving");
        return Ok((health, Escalation::Idle));
    }

    let step = escalation.observe(health);
    match step {
        Escalation::Retry { attempt } => {
            warn!(
                attempt,
                seconds_ago = ?seconds_ago,
                expected = config.interval_seconds(),
                "self-trigger chain overdue, spawning recovery"
            );
            state
                .controller
                .spawn_lineage(CycleKind::Recovery, 0)
                .await?;
        }
        Escalation::Exhausted => {
            error!(
                attempts = escalation.attempts(),
                "self-trigger chain still critical, giving up until it recovers"
            );
        }
        Escalation::Idle => {}
    }
    Ok((health, step))
}
