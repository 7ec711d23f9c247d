//! Error classification and backoff policy.
//!
//! Failures are bucketed into an [`ErrorKind`] with a per-kind backoff
//! multiplier and retry cap. Anything that matches no rule is treated as a
//! transient network failure rather than a fatal one, erring toward
//! availability.

use std::time::Duration;

use rand::Rng;

use super::breaker::{BreakerDecision, BreakerMap, BreakerSettings};
use crate::transport::TransportError;

/// Delays never drop below this floor, jitter included.
pub const MIN_DELAY_MS: u64 = 100;

/// Failure category driving retry eligibility and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Network,
    Server,
    RateLimit,
    Security,
    Client,
}

impl ErrorKind {
    /// Deterministic classification, first match wins.
    pub fn classify(err: &TransportError) -> ErrorKind {
        match err {
            TransportError::Timeout { .. } => ErrorKind::Timeout,
            TransportError::Network(_) => ErrorKind::Network,
            TransportError::Http { status: 429, .. } => ErrorKind::RateLimit,
            TransportError::Http { status, .. } if *status >= 500 => ErrorKind::Server,
            _ if err.is_security() => ErrorKind::Security,
            TransportError::Http { status, .. } if *status >= 400 => ErrorKind::Client,
            // Unmatched shapes (including parse failures) are assumed
            // transient.
            _ => ErrorKind::Network,
        }
    }

    pub fn retryable(self) -> bool {
        !matches!(self, ErrorKind::Security | ErrorKind::Client)
    }

    /// Backoff multiplier applied per attempt.
    pub fn multiplier(self) -> f64 {
        match self {
            ErrorKind::Timeout => 1.2,
            ErrorKind::Network => 1.5,
            ErrorKind::Server => 2.0,
            ErrorKind::RateLimit => 3.0,
            ErrorKind::Security | ErrorKind::Client => 1.0,
        }
    }

    /// Per-kind retry cap; the global cap still applies on top.
    pub fn max_retries(self) -> u32 {
        match self {
            ErrorKind::Timeout => 2,
            ErrorKind::Network => 3,
            ErrorKind::Server => 3,
            ErrorKind::RateLimit => 2,
            ErrorKind::Security | ErrorKind::Client => 0,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Server => write!(f, "server"),
            ErrorKind::RateLimit => write!(f, "rate_limit"),
            ErrorKind::Security => write!(f, "security"),
            ErrorKind::Client => write!(f, "client"),
        }
    }
}

/// Backoff parameters, sourced from the pipeline tunables.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_pct: 0.25,
        }
    }
}

/// Decides retry eligibility and backoff delay, and owns the breaker map.
#[derive(Debug, Default)]
pub struct RetryEngine {
    breakers: BreakerMap,
}

impl RetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breakers(&self) -> &BreakerMap {
        &self.breakers
    }

    /// Check the circuit for `name`, performing the lazy half-open
    /// transition when due.
    pub fn allow(&self, name: &str, breaker: &BreakerSettings) -> BreakerDecision {
        self.breakers.allow(name, breaker)
    }

    /// Record a completion against the circuit for `name`.
    pub fn record(&self, name: &str, success: bool, breaker: &BreakerSettings) {
        self.breakers.record(name, success, breaker);
    }

    /// Retry eligibility: the circuit is not open, the error class is
    /// retryable, and the attempt count is under both the per-kind and
    /// global caps. `max_retries` overrides the global cap when set.
    pub fn should_retry(
        &self,
        err: &TransportError,
        attempt: u32,
        name: &str,
        max_retries: Option<u32>,
        settings: &RetrySettings,
        breaker: &BreakerSettings,
    ) -> bool {
        if self.breakers.is_open(name, breaker) {
            return false;
        }
        let kind = ErrorKind::classify(err);
        let cap = kind
            .max_retries()
            .min(max_retries.unwrap_or(settings.max_retries));
        kind.retryable() && attempt < cap
    }

    /// Backoff delay for the given attempt:
    /// `min(max_delay, base * multiplier^attempt)`, jittered by a uniform
    /// offset of up to ±`jitter_pct`, floored at [`MIN_DELAY_MS`]. Jitter
    /// spreads out retry storms when many operations fail at once.
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind, settings: &RetrySettings) -> Duration {
        let raw = settings.base_delay_ms as f64 * kind.multiplier().powi(attempt as i32);
        let capped = raw.min(settings.max_delay_ms as f64);
        let span = settings.jitter_pct * capped;
        let jittered = if span > 0.0 {
            capped + rand::rng().random_range(-span..=span)
        } else {
            capped
        };
        Duration::from_millis(jittered.max(MIN_DELAY_MS as f64) as u64)
    }

    /// Delay for a concrete error, honoring a server-provided Retry-After
    /// hint when it exceeds the computed backoff.
    pub fn delay_for_error(
        &self,
        err: &TransportError,
        attempt: u32,
        settings: &RetrySettings,
    ) -> Duration {
        let computed = self.delay_for(attempt, ErrorKind::classify(err), settings);
        match err {
            TransportError::Http {
                retry_after_ms: Some(ms),
                ..
            } => computed.max(Duration::from_millis(*ms)),
            _ => computed,
        }
    }
}
