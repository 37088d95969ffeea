//! Error types for the approval backend.

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid artifact reference: {reference:?}")]
    InvalidReference { reference: String },

    #[error("Unexpected response: {message}")]
    InvalidResponse { message: String },
}

impl BackendError {
    /// Whether re-issuing the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Request(_) => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            BackendError::InvalidReference { .. } | BackendError::InvalidResponse { .. } => false,
        }
    }
}
