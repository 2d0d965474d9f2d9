use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use keel_reconcile::{
    AbortScope, ExecutorConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_ACTIONS_PER_TICK,
    DEFAULT_RECONCILE_INTERVAL, DEFAULT_START_FAILURE_GRACE_PERIOD,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub state_dir: PathBuf,
    pub reconcile_interval: Duration,
    pub call_timeout: Duration,
    pub cluster_endpoint: String,
    pub abort_scope: AbortScope,
    pub max_actions_per_tick: usize,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("KEEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let state_dir = std::env::var("KEEL_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./state"));

        let reconcile_interval = secs_from_env(
            "KEEL_RECONCILE_INTERVAL_SECS",
            DEFAULT_RECONCILE_INTERVAL.as_secs(),
        )?;
        let call_timeout = secs_from_env("KEEL_CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT.as_secs())?;
        let shutdown_timeout = secs_from_env("KEEL_SHUTDOWN_TIMEOUT_SECS", 30)?;

        let cluster_endpoint = std::env::var("KEEL_CLUSTER_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:8529".to_string());

        let abort_scope = std::env::var("KEEL_ABORT_SCOPE")
            .unwrap_or_else(|_| "plan".to_string())
            .parse()
            .map_err(anyhow::Error::msg)
            .context("KEEL_ABORT_SCOPE")?;

        let max_actions_per_tick = match std::env::var("KEEL_MAX_ACTIONS_PER_TICK") {
            Ok(value) => value
                .parse()
                .context("KEEL_MAX_ACTIONS_PER_TICK must be a positive integer")?,
            Err(_) => DEFAULT_MAX_ACTIONS_PER_TICK,
        };

        Ok(Self {
            log_level,
            state_dir,
            reconcile_interval,
            call_timeout,
            cluster_endpoint,
            abort_scope,
            max_actions_per_tick,
            shutdown_timeout,
        })
    }

    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            call_timeout: self.call_timeout,
            start_failure_grace_period: DEFAULT_START_FAILURE_GRACE_PERIOD,
            abort_scope: self.abort_scope,
            max_actions_per_tick: self.max_actions_per_tick,
        }
    }
}

fn secs_from_env(var: &str, default: u64) -> Result<Duration> {
    let secs = match std::env::var(var) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{var} must be a number of seconds"))?,
        Err(_) => default,
    };
    Ok(Duration::from_secs(secs))
}
