//! Typed notification stream.
//!
//! Informational events decoupled from outcome channels, intended for
//! transient UI toasts. Collaborators subscribe through
//! `Pipeline::subscribe`; messages are precomputed user-facing text.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Completed,
    Retrying { attempt: u32, max: u32 },
    Failed,
    EnvelopeMismatch,
    PersistenceError,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub kind: NotificationKind,
    /// Logical operation name this event belongs to.
    pub operation: String,
    /// User-facing message; never a raw status code or stack trace.
    pub message: String,
}

impl Notification {
    pub fn completed(operation: &str) -> Self {
        Self {
            severity: Severity::Info,
            kind: NotificationKind::Completed,
            operation: operation.to_string(),
            message: "Saved.".to_string(),
        }
    }

    pub fn retrying(operation: &str, attempt: u32, max: u32) -> Self {
        Self {
            severity: Severity::Warning,
            kind: NotificationKind::Retrying { attempt, max },
            operation: operation.to_string(),
            message: format!("Retrying\u{2026} (attempt {attempt} of {max})"),
        }
    }

    pub fn failed(operation: &str, user_message: String) -> Self {
        Self {
            severity: Severity::Error,
            kind: NotificationKind::Failed,
            operation: operation.to_string(),
            message: user_message,
        }
    }

    pub fn envelope_mismatch(operation: &str) -> Self {
        Self {
            severity: Severity::Warning,
            kind: NotificationKind::EnvelopeMismatch,
            operation: operation.to_string(),
            message: "The server answered in an unexpected format.".to_string(),
        }
    }

    pub fn persistence_error(detail: &str) -> Self {
        Self {
            severity: Severity::Warning,
            kind: NotificationKind::PersistenceError,
            operation: String::new(),
            message: format!("Pending changes could not be saved locally: {detail}"),
        }
    }
}
