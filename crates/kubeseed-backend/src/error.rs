//! Backend error taxonomy
//!
//! Every adapter call resolves to success, `NotFound`, `Transient`, or
//! `Terminal`. Callers branch on the class, never on backend-specific
//! error strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// The resource does not exist on the backend.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Throttling, transport failures, eventual-consistency lag. Safe to
    /// retry within a bounded policy.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Quota, validation, authentication. Retrying will not help.
    #[error("terminal backend error: {0}")]
    Terminal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Whether a bounded retry is worthwhile. IO errors are treated as
    /// transport failures; malformed JSON from a backend is not going to
    /// parse better on the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_) | BackendError::Io(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_transient() && !self.is_not_found()
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
