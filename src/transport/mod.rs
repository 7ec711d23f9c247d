//! HTTP transport: sends one request to the backend endpoint and returns a
//! normalized response or a classified [`TransportError`].

pub mod client;
pub mod error;
pub mod types;

pub use client::HttpTransport;
pub use error::TransportError;
pub use types::{Envelope, RequestBody, ResponseBody, TransportRequest, TransportResponse, TransportTotals};

use std::future::Future;

/// The pipeline's seam to the network. Chosen once at construction; tests
/// substitute scripted implementations.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        req: TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;

    /// Running totals for instrumentation. Implementations without
    /// bookkeeping report zeros.
    fn totals(&self) -> TransportTotals {
        TransportTotals::default()
    }
}
