use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;

use super::error::TransportError;
use super::types::{RequestBody, TransportRequest, TransportResponse, TransportTotals};
use super::Transport;

/// Real HTTP transport over `reqwest`.
///
/// Owns per-request timeout enforcement (a timed-out call is cancelled by
/// dropping the in-flight future) and the running instrumentation totals.
pub struct HttpTransport {
    client: Client,
    totals: Mutex<TransportTotals>,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            totals: Mutex::new(TransportTotals::default()),
        }
    }

    async fn dispatch(&self, req: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let started = std::time::Instant::now();
        let timeout_ms = req.timeout.as_millis() as u64;

        let mut builder = self
            .client
            .request(req.method.clone(), &req.url)
            .timeout(req.timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        builder = match &req.body {
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout_ms }
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let message = response
                .text()
                .await
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            return Err(TransportError::Http {
                status: status.as_u16(),
                message,
                retry_after_ms,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { timeout_ms }
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        TransportResponse::from_body(
            status.as_u16(),
            content_type.as_deref(),
            &text,
            req.validate_envelope,
            started.elapsed(),
        )
    }

    fn record(&self, outcome: &Result<TransportResponse, TransportError>, latency: Duration) {
        let mut totals = self.totals.lock().expect("transport totals lock poisoned");
        totals.requests += 1;
        totals.total_latency_ms += latency.as_millis() as u64;
        match outcome {
            Ok(resp) => {
                totals.successes += 1;
                if !resp.envelope_ok {
                    totals.envelope_mismatches += 1;
                }
            }
            Err(_) => totals.failures += 1,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    async fn send(&self, req: TransportRequest) -> Result<TransportResponse, TransportError> {
        let started = std::time::Instant::now();
        let outcome = self.dispatch(&req).await;
        self.record(&outcome, started.elapsed());
        outcome
    }

    fn totals(&self) -> TransportTotals {
        self.totals
            .lock()
            .expect("transport totals lock poisoned")
            .clone()
    }
}
