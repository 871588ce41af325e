//! Endpoint probes behind `GET /check-runner`.
//!
//! One round GETs every configured service concurrently. A service is up when
//! it answers 2xx within its timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};
use vigil_core::config::ServiceConfig;
use vigil_cycle::{CheckExecutor, CheckOutcome, CycleError};
use vigil_store::SettingsStore;

/// Outcome of probing one service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProbe {
    pub name: String,
    pub url: String,
    pub up: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `GET /check-runner`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub cycle_id: String,
    /// Interval (ms) governing scheduling when the round ran.
    pub refresh_interval: u64,
    pub services_checked: u32,
    pub results: Vec<ServiceProbe>,
}

pub struct ProbeRunner {
    client: reqwest::Client,
    services: Vec<ServiceConfig>,
    settings: Arc<SettingsStore>,
}

impl ProbeRunner {
    pub fn new(services: Vec<ServiceConfig>, settings: Arc<SettingsStore>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vigil-probe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            services,
            settings,
        })
    }

    pub async fn run(&self, cycle_id: &str) -> Result<ProbeReport, CycleError> {
        let refresh_interval = self
            .settings
            .scheduler_config()
            .map_err(|e| CycleError::Config(e.to_string()))?
            .refresh_interval_ms;

        let results = join_all(self.services.iter().map(|svc| self.probe(svc))).await;
        let up = results.iter().filter(|r| r.up).count();
        debug!(%cycle_id, services = results.len(), up, "probe round finished");

        Ok(ProbeReport {
            cycle_id: cycle_id.to_string(),
            refresh_interval,
            services_checked: results.len() as u32,
            results,
        })
    }

    async fn probe(&self, service: &ServiceConfig) -> ServiceProbe {
        let started = Instant::now();
        let response = self
            .client
            .get(&service.url)
            .timeout(Duration::from_millis(service.timeout_ms))
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() {
                    warn!(service = %service.name, %status, "service answered with error status");
                }
                ServiceProbe {
                    name: service.name.clone(),
                    url: service.url.clone(),
                    up: status.is_success(),
                    status: Some(status.as_u16()),
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(service = %service.name, error = %e, "service unreachable");
                ServiceProbe {
                    name: service.name.clone(),
                    url: service.url.clone(),
                    up: false,
                    status: None,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// In-process check path used when continuations are dispatched locally.
#[async_trait]
impl CheckExecutor for ProbeRunner {
    async fn run_check(&self, cycle_id: &str) -> vigil_cycle::Result<CheckOutcome> {
        let report = self.run(cycle_id).await?;
        Ok(CheckOutcome {
            refresh_interval: report.refresh_interval,
            services_checked: report.services_checked,
        })
    }
}
