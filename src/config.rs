//! Configuration loaded from `courier.toml`.
//!
//! [`CourierConfig`] carries everything the pipeline needs at construction:
//! the single upstream endpoint, the action namespace, the ordered nonce
//! sources and the runtime [`Tunables`]. Values absent from the file fall
//! back to sensible defaults. `COURIER_ENDPOINT` takes precedence over the
//! file for the endpoint URL.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    /// The single backend endpoint every operation posts to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Prefix applied to operation names to build the wire `action` field.
    #[serde(default = "default_namespace")]
    pub action_namespace: String,

    /// Explicit CSRF token. First nonce source in precedence order.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Environment variable consulted when no explicit nonce is set.
    #[serde(default = "default_nonce_env")]
    pub nonce_env: String,

    /// File read as a last-resort nonce source (trimmed).
    #[serde(default)]
    pub nonce_file: Option<PathBuf>,

    /// Queue snapshot location. `None` disables persistence.
    #[serde(default = "default_persist_path")]
    pub persist_path: Option<PathBuf>,

    #[serde(default)]
    pub tunables: Tunables,
}

fn default_endpoint() -> String {
    "http://localhost:8080/courier".to_string()
}

fn default_namespace() -> String {
    "courier_".to_string()
}

fn default_nonce_env() -> String {
    "COURIER_NONCE".to_string()
}

fn default_persist_path() -> Option<PathBuf> {
    Some(PathBuf::from(".courier/queue.json"))
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            action_namespace: default_namespace(),
            nonce: None,
            nonce_env: default_nonce_env(),
            nonce_file: None,
            persist_path: default_persist_path(),
            tunables: Tunables::default(),
        }
    }
}

impl CourierConfig {
    /// Load configuration from `courier.toml` in the working directory,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("courier.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<CourierConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment takes precedence over the file for the endpoint.
        if let Ok(url) = std::env::var("COURIER_ENDPOINT")
            && !url.is_empty()
        {
            config.endpoint = url;
        }

        Ok(config)
    }

    /// Resolve the CSRF nonce by walking the sources in precedence order:
    /// explicit config value, environment variable, nonce file.
    pub fn resolve_nonce(&self) -> Option<String> {
        if let Some(nonce) = &self.nonce
            && !nonce.is_empty()
        {
            return Some(nonce.clone());
        }
        if let Ok(nonce) = std::env::var(&self.nonce_env)
            && !nonce.is_empty()
        {
            return Some(nonce);
        }
        if let Some(path) = &self.nonce_file
            && let Ok(contents) = std::fs::read_to_string(path)
        {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        None
    }
}

/// Runtime-tunable pipeline parameters.
///
/// Threshold defaults match the values the system shipped with, but none of
/// them is load-bearing: everything here can be overridden via `courier.toml`
/// or `Pipeline::configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    /// Concurrency ceiling for in-flight operations.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Global retry cap; per-error-kind caps still apply.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter applied to backoff delays, as a fraction of the delay.
    #[serde(default = "default_jitter_pct")]
    pub jitter_pct: f64,

    /// Completions required before the breaker may trip.
    #[serde(default = "default_breaker_min_samples")]
    pub breaker_min_samples: u64,

    /// Failure rate at which the breaker opens.
    #[serde(default = "default_breaker_failure_rate")]
    pub breaker_failure_rate: f64,

    /// How long an open circuit blocks requests, in milliseconds.
    #[serde(default = "default_breaker_timeout_ms")]
    pub breaker_timeout_ms: u64,

    /// Maximum pending operations across all lanes.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Window during which completed operations suppress duplicates, in
    /// milliseconds.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Dispatch loop tick, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Batch flushes once it holds this many operations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batch flushes after this window even if not full, in milliseconds.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Batch members executed concurrently per chunk.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Abort unexecuted batch members after the first failure.
    #[serde(default)]
    pub batch_fail_fast: bool,

    /// Queue snapshots older than this are discarded on restore, in
    /// milliseconds.
    #[serde(default = "default_snapshot_max_age_ms")]
    pub snapshot_max_age_ms: u64,

    /// History ring capacity.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_pct() -> f64 {
    0.25
}

fn default_breaker_min_samples() -> u64 {
    5
}

fn default_breaker_failure_rate() -> f64 {
    0.5
}

fn default_breaker_timeout_ms() -> u64 {
    60_000
}

fn default_max_queue_size() -> usize {
    200
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_tick_ms() -> u64 {
    100
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_window_ms() -> u64 {
    1000
}

fn default_batch_concurrency() -> usize {
    3
}

fn default_snapshot_max_age_ms() -> u64 {
    3_600_000
}

fn default_history_size() -> usize {
    200
}

impl Tunables {
    /// Backoff parameters in the shape the retry engine consumes.
    pub fn retry_settings(&self) -> crate::retry::RetrySettings {
        crate::retry::RetrySettings {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_pct: self.jitter_pct,
        }
    }

    /// Circuit thresholds in the shape the breaker map consumes.
    pub fn breaker_settings(&self) -> crate::retry::BreakerSettings {
        crate::retry::BreakerSettings {
            min_samples: self.breaker_min_samples,
            failure_rate: self.breaker_failure_rate,
            open_timeout: std::time::Duration::from_millis(self.breaker_timeout_ms),
        }
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_pct: default_jitter_pct(),
            breaker_min_samples: default_breaker_min_samples(),
            breaker_failure_rate: default_breaker_failure_rate(),
            breaker_timeout_ms: default_breaker_timeout_ms(),
            max_queue_size: default_max_queue_size(),
            dedup_window_ms: default_dedup_window_ms(),
            tick_ms: default_tick_ms(),
            batch_size: default_batch_size(),
            batch_window_ms: default_batch_window_ms(),
            batch_concurrency: default_batch_concurrency(),
            batch_fail_fast: false,
            snapshot_max_age_ms: default_snapshot_max_age_ms(),
            history_size: default_history_size(),
        }
    }
}
