use thiserror::Error;

use crate::transport::TransportError;

/// Terminal errors surfaced to submitters.
///
/// Transport-level failures are handled internally by the retry engine and
/// only reach the caller once retries are exhausted or the failure is
/// non-retryable. Everything here is `Clone` so that deduplicated
/// submissions can observe the same outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// No configured nonce source produced a token. Hard submission error,
    /// never retried.
    #[error("no nonce available from any configured source")]
    MissingNonce,

    /// Queue admission rejected the operation. Explicit backpressure,
    /// never retried.
    #[error("queue full: {pending} operations pending (limit {limit})")]
    QueueFull { pending: usize, limit: usize },

    /// The circuit for this operation name is open; no network call was made.
    #[error("circuit open for '{name}'")]
    CircuitOpen { name: String },

    /// Transport failure that survived (or bypassed) retry handling.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered with `success: false`.
    #[error("request rejected: {message}")]
    Rejected { message: String },

    /// A fail-fast batch aborted this member before it executed.
    #[error("batch aborted after an earlier failure")]
    BatchAborted,

    /// The pipeline was shut down with this operation still outstanding.
    #[error("pipeline shut down before the operation completed")]
    PipelineClosed,
}

impl PipelineError {
    /// User-facing message derived purely from the error classification.
    /// Never a raw status code or a debug rendering.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::MissingNonce => {
                "Your session could not be verified. Please reload and try again.".to_string()
            }
            PipelineError::QueueFull { .. } => {
                "Too many changes are pending. Please wait a moment and retry.".to_string()
            }
            PipelineError::CircuitOpen { .. } => {
                "The server is having trouble right now. Your request was not sent.".to_string()
            }
            PipelineError::Transport(err) => err.user_message(),
            PipelineError::Rejected { message } => message.clone(),
            PipelineError::BatchAborted => {
                "This change was skipped because an earlier one failed.".to_string()
            }
            PipelineError::PipelineClosed => {
                "The request was cancelled because the page is closing.".to_string()
            }
        }
    }
}
