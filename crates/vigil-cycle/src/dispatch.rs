//! Fire-and-forget hand-off of the next invocation in a chain.
//!
//! `dispatch` enqueues an independent unit of work and returns as soon as the
//! hand-off is known to have been accepted (or not refused); it never waits
//! for the continuation itself to finish.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use vigil_core::CycleLineage;

use crate::error::{CycleError, Result};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, lineage: &CycleLineage) -> Result<()>;
}

/// Query parameters for `GET /ping-cycle?mode=cycle`.
pub fn lineage_query(lineage: &CycleLineage) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "cycle".to_string()),
        ("cycleId", lineage.cycle_id.clone()),
        ("lineageId", lineage.lineage_id.clone()),
        ("kind", lineage.kind.to_string()),
        ("delay", lineage.delay_ms.to_string()),
        ("lineageStart", lineage.started_at.to_string()),
    ]
}

/// Self-invokes the gateway over HTTP.
///
/// The request runs in a detached task for as long as the receiving
/// invocation takes (its sleep included). `dispatch` only waits `ack_timeout`
/// for an early failure: a connect error or an immediate non-2xx answer. If
/// neither arrives in time the request is in flight and counts as delivered.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    ack_timeout: Duration,
}

impl HttpDispatcher {
    /// `request_timeout` must exceed the longest sleep a continuation can take.
    pub fn new(
        base_url: impl Into<String>,
        ack_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vigil-cycle/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| CycleError::Dispatch(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            ack_timeout,
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, lineage: &CycleLineage) -> Result<()> {
        let request = self
            .client
            .get(format!("{}/ping-cycle", self.base_url))
            .query(&lineage_query(lineage))
            .build()
            .map_err(|e| CycleError::Dispatch(format!("bad continuation request: {e}")))?;

        let (ack_tx, ack_rx) = oneshot::channel::<std::result::Result<(), String>>();
        let client = self.client.clone();
        let cycle_id = lineage.cycle_id.clone();
        tokio::spawn(async move {
            match client.execute(request).await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(%cycle_id, status = %resp.status(), "continuation completed");
                    let _ = ack_tx.send(Ok(()));
                }
                Ok(resp) => {
                    warn!(%cycle_id, status = %resp.status(), "continuation rejected");
                    let _ = ack_tx.send(Err(format!("continuation returned {}", resp.status())));
                }
                Err(e) => {
                    warn!(%cycle_id, error = %e, "continuation request failed");
                    let _ = ack_tx.send(Err(e.to_string()));
                }
            }
        });

        match tokio::time::timeout(self.ack_timeout, ack_rx).await {
            // Still running after the ack window: the receiver is sleeping.
            Err(_) => Ok(()),
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(CycleError::Dispatch(reason)),
            Ok(Err(_)) => Err(CycleError::Dispatch(
                "continuation task ended without a result".to_string(),
            )),
        }
    }
}

/// Hands lineages to an in-process pump (see [`crate::CycleController::drive`]).
pub struct LocalDispatcher {
    tx: mpsc::UnboundedSender<CycleLineage>,
}

impl LocalDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CycleLineage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, lineage: &CycleLineage) -> Result<()> {
        self.tx
            .send(lineage.clone())
            .map_err(|_| CycleError::Dispatch("local cycle pump has stopped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::CycleKind;

    #[test]
    fn query_carries_the_whole_lineage() {
        let lineage = CycleLineage::initial(1_234).next(CycleKind::Backup, 15_000);
        let query = lineage_query(&lineage);
        let get = |k: &str| {
            query
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("mode"), "cycle");
        assert_eq!(get("cycleId"), lineage.cycle_id);
        assert_eq!(get("lineageId"), lineage.lineage_id);
        assert_eq!(get("kind"), "backup");
        assert_eq!(get("delay"), "15000");
        assert_eq!(get("lineageStart"), "1234");
    }

    #[tokio::test]
    async fn local_dispatch_fails_once_pump_is_gone() {
        let (dispatcher, rx) = LocalDispatcher::channel();
        let lineage = CycleLineage::initial(0);
        dispatcher.dispatch(&lineage).await.unwrap();
        drop(rx);
        assert!(dispatcher.dispatch(&lineage).await.is_err());
    }

    #[tokio::test]
    async fn http_dispatch_reports_refused_connection() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let dispatcher = HttpDispatcher::new(
            "http://127.0.0.1:9",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = dispatcher.dispatch(&CycleLineage::initial(0)).await;
        assert!(matches!(result, Err(CycleError::Dispatch(_))));
    }
}
