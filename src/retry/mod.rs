//! Failure classification, backoff and per-operation circuit breaking.

pub mod breaker;
pub mod engine;

pub use breaker::{BreakerDecision, BreakerMap, BreakerSettings, BreakerSnapshot, BreakerStateKind};
pub use engine::{ErrorKind, RetryEngine, RetrySettings};
