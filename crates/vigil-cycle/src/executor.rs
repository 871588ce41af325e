use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CycleError, Result};

/// Result of one round of endpoint checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    /// Interval (ms) that governed scheduling when the round ran.
    pub refresh_interval: u64,
    #[serde(default)]
    pub services_checked: u32,
}

/// Performs one round of endpoint checks for a cycle.
#[async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn run_check(&self, cycle_id: &str) -> Result<CheckOutcome>;
}

/// Calls the gateway's `/check-runner` boundary over HTTP.
pub struct HttpCheckExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCheckExecutor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vigil-cycle/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CycleError::Check(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl CheckExecutor for HttpCheckExecutor {
    async fn run_check(&self, cycle_id: &str) -> Result<CheckOutcome> {
        let url = format!("{}/check-runner", self.base_url);
        let outcome: CheckOutcome = self
            .client
            .get(&url)
            .query(&[("cycleId", cycle_id)])
            .send()
            .await
            .map_err(|e| CycleError::Check(format!("check runner unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| CycleError::Check(format!("check runner failed: {e}")))?
            .json()
            .await
            .map_err(|e| CycleError::Check(format!("check runner response: {e}")))?;
        debug!(%cycle_id, services = outcome.services_checked, "check runner responded");
        Ok(outcome)
    }
}
