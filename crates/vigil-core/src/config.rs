use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::SchedulerConfig;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Delay used by recovery and backup continuations.
pub const RECOVERY_DELAY_MS: u64 = 15_000;
/// Interval used when the scheduler config cannot be read at bootstrap.
pub const FALLBACK_INTERVAL_MS: u64 = 60_000;
/// Observed hard limit for a single invocation.
pub const INVOCATION_CEILING_SECS: u64 = 300;
/// How long a dispatcher waits for a connect error before assuming delivery.
pub const DISPATCH_ACK_MS: u64 = 2_000;
/// Number of check events retained in the history ring.
pub const HISTORY_LIMIT: usize = 100;

/// Top-level config (vigil.toml + VIGIL_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    /// Seed for the stored scheduler config; only used when none is stored yet.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Base URL this process uses to invoke itself. Defaults to `http://{bind}:{port}`.
    pub public_url: Option<String>,
}

impl GatewayConfig {
    pub fn base_url(&self) -> String {
        match self.public_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind, self.port),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How continuations and checks are invoked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /// Fire-and-forget HTTP calls to this gateway's own endpoints.
    #[default]
    Http,
    /// Tokio tasks inside the running process.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    #[serde(default = "default_invocation_ceiling_secs")]
    pub invocation_ceiling_secs: u64,
    #[serde(default = "default_dispatch_ack_ms")]
    pub dispatch_ack_ms: u64,
    /// Start an initial cycle when the gateway boots.
    #[serde(default = "bool_true")]
    pub autostart: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            recovery_delay_ms: RECOVERY_DELAY_MS,
            fallback_interval_ms: FALLBACK_INTERVAL_MS,
            invocation_ceiling_secs: INVOCATION_CEILING_SECS,
            dispatch_ack_ms: DISPATCH_ACK_MS,
            autostart: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_watchdog_poll_secs")]
    pub poll_secs: u64,
    /// Consecutive recovery attempts before the watchdog gives up.
    #[serde(default = "default_watchdog_max_attempts")]
    pub max_attempts: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: default_watchdog_poll_secs(),
            max_attempts: default_watchdog_max_attempts(),
        }
    }
}

/// An external HTTP endpoint whose reachability is checked each round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_recovery_delay_ms() -> u64 {
    RECOVERY_DELAY_MS
}
fn default_fallback_interval_ms() -> u64 {
    FALLBACK_INTERVAL_MS
}
fn default_invocation_ceiling_secs() -> u64 {
    INVOCATION_CEILING_SECS
}
fn default_dispatch_ack_ms() -> u64 {
    DISPATCH_ACK_MS
}
fn default_history_limit() -> usize {
    HISTORY_LIMIT
}
fn default_watchdog_poll_secs() -> u64 {
    30
}
fn default_watchdog_max_attempts() -> u32 {
    3
}
fn default_service_timeout_ms() -> u64 {
    10_000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vigil/vigil.db", home)
}

impl VigilConfig {
    /// Load config from a TOML file with VIGIL_* env var overrides.
    ///
    /// Nested keys use a double underscore: `VIGIL_GATEWAY__PORT=9000`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VigilConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .map_err(|e| crate::error::VigilError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vigil/vigil.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = VigilConfig::default();
        assert_eq!(config.cycle.recovery_delay_ms, 15_000);
        assert_eq!(config.cycle.fallback_interval_ms, 60_000);
        assert_eq!(config.cycle.invocation_ceiling_secs, 300);
        assert_eq!(config.watchdog.max_attempts, 3);
        assert_eq!(config.scheduler.refresh_interval_ms, 60_000);
        assert_eq!(config.gateway.base_url(), "http://127.0.0.1:8787");
    }

    #[test]
    fn public_url_trailing_slash_is_trimmed() {
        let gateway = GatewayConfig {
            public_url: Some("https://status.example.com/".to_string()),
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.base_url(), "https://status.example.com");
    }

    #[test]
    fn toml_sections_parse() {
        let toml = r#"
            [cycle]
            dispatch = "local"

            [scheduler]
            refresh_interval_ms = 30000
            ci_schedule = { expression = "*/10 * * * *", enabled = true }

            [[services]]
            name = "api"
            url = "https://api.example.com/health"
        "#;
        let config: VigilConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(config.cycle.dispatch, DispatchMode::Local);
        assert_eq!(config.scheduler.refresh_interval_ms, 30_000);
        assert!(config.scheduler.ci_schedule.enabled);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].timeout_ms, 10_000);
    }
}
