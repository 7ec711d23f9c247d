//! Transport failure taxonomy.
//!
//! Every error carries a retryability hint and a precomputed user-facing
//! message decided purely from its classification, so callers never branch
//! on raw status codes.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// No connectivity, DNS failure, connection reset or aborted call.
    #[error("network error: {0}")]
    Network(String),

    /// No response arrived before the per-request timeout; the in-flight
    /// call was cancelled.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The server answered with HTTP status >= 400.
    /// `retry_after_ms` is populated from the Retry-After header on 429.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// A body arrived but could not be decoded as its declared content type.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s))
    }

    /// True for 401/403 responses whose message points at an expired or
    /// invalid security token rather than a plain permission problem.
    pub fn is_security(&self) -> bool {
        match self {
            TransportError::Http {
                status: 401 | 403,
                message,
                ..
            } => {
                let lower = message.to_lowercase();
                ["nonce", "token", "csrf", "security"]
                    .iter()
                    .any(|kw| lower.contains(kw))
            }
            _ => false,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(s) if s >= 500)
    }

    /// Retryability hint. Client errors (4xx other than 429) are the only
    /// failures considered permanent at this layer; unknown shapes err
    /// toward availability.
    pub fn retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Timeout { .. } => true,
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Parse(_) => true,
        }
    }

    /// User-facing message for notifications. Classification-derived; never
    /// includes the status code or a debug rendering.
    pub fn user_message(&self) -> String {
        if self.is_security() {
            return "Your session has expired. Please reload and try again.".to_string();
        }
        match self {
            TransportError::Network(_) => {
                "Connection problem. Check your network and try again.".to_string()
            }
            TransportError::Timeout { .. } => {
                "The request took too long. Please try again.".to_string()
            }
            TransportError::Http { status: 429, .. } => {
                "Too many requests. Please wait a moment before retrying.".to_string()
            }
            TransportError::Http { status, .. } if *status >= 500 => {
                "The server had a problem. Please try again shortly.".to_string()
            }
            TransportError::Http { .. } => {
                "The request could not be processed. Please check your input.".to_string()
            }
            TransportError::Parse(_) => {
                "Received an unexpected response from the server.".to_string()
            }
        }
    }
}
