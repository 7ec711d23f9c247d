//! Request/response shapes crossing the transport seam.

use std::time::Duration;

use serde::Serialize;

use super::error::TransportError;

/// A fully-prepared outbound request. The body is already serialized; the
/// transport only decides encoding and enforces the timeout.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Duration,
    /// Assert the `{success, data}` envelope on the response. Mismatches are
    /// tolerated and flagged, not failed.
    pub validate_envelope: bool,
}

/// Body encoding. Multipart is used when the payload carries object-like
/// fields, each serialized as a JSON string per field.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, String)>),
}

impl RequestBody {
    pub fn fields(&self) -> &[(String, String)] {
        match self {
            RequestBody::Form(fields) | RequestBody::Multipart(fields) => fields,
        }
    }
}

/// Parsed response body, decoded according to the declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

/// The two-field response envelope the backend is expected to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub data: serde_json::Value,
}

impl Envelope {
    /// Extract the envelope from a JSON body. Returns `None` when the shape
    /// does not match (non-object, or `success` missing or non-bool).
    pub fn extract(value: &serde_json::Value) -> Option<Envelope> {
        let obj = value.as_object()?;
        let success = obj.get("success")?.as_bool()?;
        let data = obj.get("data").cloned().unwrap_or(serde_json::Value::Null);
        Some(Envelope { success, data })
    }

    /// Terminal error message for a `success: false` envelope:
    /// `data.message` when present, otherwise `data` rendered as a string.
    pub fn error_message(&self) -> String {
        if let Some(message) = self.data.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "request failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// A normalized response. HTTP status is always < 400 here; failures are
/// surfaced as [`TransportError`] instead.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: ResponseBody,
    /// Present when the body carried a recognizable envelope.
    pub envelope: Option<Envelope>,
    /// False when validation was requested and the envelope did not match.
    pub envelope_ok: bool,
    pub latency: Duration,
}

impl TransportResponse {
    /// Build a response from a raw body, decoding by content type and
    /// validating the envelope when asked.
    pub fn from_body(
        status: u16,
        content_type: Option<&str>,
        text: &str,
        validate_envelope: bool,
        latency: Duration,
    ) -> Result<Self, TransportError> {
        let is_json = content_type.is_some_and(|ct| ct.contains("application/json"));
        let body = if is_json {
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| TransportError::Parse(e.to_string()))?;
            ResponseBody::Json(value)
        } else {
            ResponseBody::Text(text.to_string())
        };

        let envelope = match &body {
            ResponseBody::Json(value) => Envelope::extract(value),
            ResponseBody::Text(_) => None,
        };
        let envelope_ok = !validate_envelope || envelope.is_some();

        Ok(Self {
            status,
            body,
            envelope,
            envelope_ok,
            latency,
        })
    }
}

/// Running totals updated after every call, for instrumentation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportTotals {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_latency_ms: u64,
    pub envelope_mismatches: u64,
}

impl TransportTotals {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_latency_ms / self.requests
        }
    }
}
