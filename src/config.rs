//! Process configuration, read from `GATEWAY_*` environment variables.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::engine::{EngineOptions, DEFAULT_TASK_QUEUE};
use crate::worker::WorkerOptions;

pub const CREDENTIAL_HEADER: &str = "x-api-key";

/// Key accepted out of the box, and the identity it maps to.
pub const DEFAULT_API_KEY: (&str, &str) = ("BAPE-SECRET-KEY", "default-user");

pub const DEFAULT_WORKFLOW_ID_PREFIX: &str = "bape-workflow";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// API key to identity
    pub api_keys: HashMap<String, String>,
    pub rate_limit_interval_ms: u64,
    pub rate_limit_burst: u32,
    pub task_queue: String,
    pub workflow_id_prefix: String,
    pub workers: usize,
    pub visibility_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://gateway.db".to_string(),
            api_keys: HashMap::from([(
                DEFAULT_API_KEY.0.to_string(),
                DEFAULT_API_KEY.1.to_string(),
            )]),
            rate_limit_interval_ms: 1000,
            rate_limit_burst: 5,
            task_queue: DEFAULT_TASK_QUEUE.to_string(),
            workflow_id_prefix: DEFAULT_WORKFLOW_ID_PREFIX.to_string(),
            workers: 4,
            visibility_timeout_ms: 30_000,
            poll_interval_ms: 100,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable source. Unset variables keep
    /// their defaults; set but malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = lookup("GATEWAY_DATABASE_URL") {
            config.database_url = v;
        }
        if let Some(v) = lookup("GATEWAY_API_KEYS") {
            config.api_keys = parse_api_keys(&v)?;
        }
        if let Some(v) = lookup("GATEWAY_RATE_LIMIT_INTERVAL_MS") {
            config.rate_limit_interval_ms = parse("GATEWAY_RATE_LIMIT_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("GATEWAY_RATE_LIMIT_BURST") {
            config.rate_limit_burst = parse("GATEWAY_RATE_LIMIT_BURST", &v)?;
        }
        if let Some(v) = lookup("GATEWAY_TASK_QUEUE") {
            config.task_queue = v;
        }
        if let Some(v) = lookup("GATEWAY_WORKFLOW_ID_PREFIX") {
            config.workflow_id_prefix = v;
        }
        if let Some(v) = lookup("GATEWAY_WORKERS") {
            config.workers = parse("GATEWAY_WORKERS", &v)?;
        }
        if let Some(v) = lookup("GATEWAY_VISIBILITY_TIMEOUT_MS") {
            config.visibility_timeout_ms = parse("GATEWAY_VISIBILITY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("GATEWAY_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse("GATEWAY_POLL_INTERVAL_MS", &v)?;
        }

        Ok(config)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::new().with_task_queue(&self.task_queue)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions::new()
            .with_worker_count(self.workers)
            .with_visibility_timeout(self.visibility_timeout())
            .with_poll_interval(self.poll_interval())
            .with_task_queue(&self.task_queue)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `key:identity,key:identity`
fn parse_api_keys(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut keys = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once(':') {
            Some((key, identity)) if !key.trim().is_empty() && !identity.trim().is_empty() => {
                keys.insert(key.trim().to_string(), identity.trim().to_string());
            }
            _ => {
                return Err(ConfigError::Invalid {
                    var: "GATEWAY_API_KEYS",
                    value: value.to_string(),
                    reason: format!("expected key:identity, got '{}'", entry),
                })
            }
        }
    }
    Ok(keys)
}
