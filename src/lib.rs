//! Courier — a resilient request pipeline for a single backend endpoint.
//!
//! Operations are submitted by logical name with a payload map and flow
//! through admission control (priority queue, deduplication, batching), a
//! retry engine with per-operation circuit breaking, and an HTTP transport
//! that speaks the form-encoded `action`/`nonce` wire format.
//!
//! The entry point is [`Pipeline`]: construct it from a [`CourierConfig`],
//! call [`Pipeline::submit`] and await the terminal outcome.

pub mod config;
pub mod error;
pub mod operation;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod transport;

pub use config::{CourierConfig, Tunables};
pub use error::PipelineError;
pub use operation::{Operation, OperationResult, Payload, Priority, SubmitOptions};
pub use pipeline::Pipeline;
