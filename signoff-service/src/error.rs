use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::artifacts::StoredArtifact;
use crate::backend::BackendError;
use crate::compositing::ContentKind;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document normalization failed")]
    Normalization(#[from] NormalizationError),

    #[error("Signature compositing failed")]
    Composite(#[from] CompositeError),

    #[error(transparent)]
    External(#[from] ExternalCallError),

    #[error("Paper {paper_id}: signed artifact was uploaded but the paper record was not updated")]
    PartialPersistence {
        paper_id: i64,
        artifact: StoredArtifact,
        #[source]
        source: ExternalCallError,
    },

    #[error("Approval chain for paper {paper_id} is not complete")]
    ChainIncomplete { paper_id: i64 },

    #[error("Signed document too large: {size} bytes (max {max} bytes)")]
    OutputTooLarge { size: u64, max: u64 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors turning a source document into its base PDF. Always fatal.
#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("Failed to decode {format} image")]
    ImageDecode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },

    #[error("Source document is not a loadable PDF")]
    InvalidPdf(#[source] lopdf::Error),

    #[error("Failed to build normalized PDF")]
    Build(#[from] PdfError),
}

/// Low-level PDF object manipulation errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("PDF structure error")]
    Structure(#[from] lopdf::Error),

    #[error("Failed to serialize PDF")]
    Io(#[from] std::io::Error),

    #[error("Document has no pages")]
    NoPages,
}

/// Placement planning precondition failures
#[derive(Error, Debug, PartialEq)]
pub enum PlanError {
    #[error("Slot count must be at least 1")]
    NoSlots,

    #[error("Page {width}x{height}pt is too small for the signature row")]
    PageTooSmall { width: f32, height: f32 },
}

/// Errors that abort compositing of the whole document
#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Base document could not be loaded")]
    Load(#[source] lopdf::Error),

    #[error("Failed to plan signature slots")]
    Plan(#[from] PlanError),

    #[error("Failed to write signature content")]
    Pdf(#[from] PdfError),
}

/// A single signer's artifact could not be placed. Recovered locally by the
/// compositor: the slot keeps its border and name.
#[derive(Error, Debug)]
pub enum SignerEmbedError {
    #[error("Signer has no signature artifact on file")]
    MissingArtifact,

    #[error("Failed to fetch signature artifact")]
    Fetch(#[source] ExternalCallError),

    #[error("Signature artifact is not a PNG, JPEG or PDF (header {header})")]
    UnknownFormat { header: String },

    #[error("Failed to decode {format} signature")]
    ImageDecode {
        format: ContentKind,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to load signature PDF")]
    PdfLoad(#[source] lopdf::Error),

    #[error("Failed to import signature PDF page")]
    PdfImport(#[source] PdfError),

    #[error("Signature artifact has empty dimensions")]
    EmptyContent,
}

/// An external call that failed after exhausting its retry budget (or failed
/// with a non-retryable error).
#[derive(Error, Debug)]
#[error("{operation} failed after {attempts} attempt(s)")]
pub struct ExternalCallError {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: BackendError,
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Normalization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ChainIncomplete { .. } => StatusCode::CONFLICT,
            ServiceError::OutputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::External(_) | ServiceError::PartialPersistence { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::Composite(_) | ServiceError::Config { .. } | ServiceError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Normalization(_) => "normalization_failed",
            ServiceError::Composite(_) => "composite_failed",
            ServiceError::External(_) => "external_call_failed",
            ServiceError::PartialPersistence { .. } => "partial_persistence",
            ServiceError::ChainIncomplete { .. } => "chain_incomplete",
            ServiceError::OutputTooLarge { .. } => "output_too_large",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::PartialPersistence {
                paper_id,
                artifact,
                source,
            } => Some(serde_json::json!({
                "paper_id": paper_id,
                "orphaned_artifact": artifact,
                "update_error": format_error_chain(source),
            })),
            ServiceError::Normalization(e) => Some(serde_json::json!({
                "error": format_error_chain(e),
            })),
            ServiceError::Composite(e) => Some(serde_json::json!({
                "error": format_error_chain(e),
            })),
            ServiceError::External(e) => Some(serde_json::json!({
                "operation": e.operation,
                "attempts": e.attempts,
                "error": format_error_chain(e),
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
            details: self.details(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as a single line
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(status: u16) -> ExternalCallError {
        ExternalCallError {
            operation: "update paper attachment".to_string(),
            attempts: 3,
            source: BackendError::Api {
                status,
                message: "unavailable".to_string(),
            },
        }
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let chain = format_error_chain(&external(503));
        assert_eq!(
            chain,
            "update paper attachment failed after 3 attempt(s): API error (status 503): unavailable"
        );
    }

    #[test]
    fn test_external_error_chain_is_not_repeated() {
        let error = ServiceError::External(external(503));
        assert_eq!(
            format_error_chain(&error),
            "update paper attachment failed after 3 attempt(s): API error (status 503): unavailable"
        );
        assert_eq!(error.to_string(), external(503).to_string());
    }

    #[test]
    fn test_partial_persistence_is_distinct() {
        let error = ServiceError::PartialPersistence {
            paper_id: 7,
            artifact: StoredArtifact {
                identifier: "42".to_string(),
                url: "https://drive.example/d/abc".to_string(),
            },
            source: external(500),
        };
        assert_eq!(error.error_code(), "partial_persistence");
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);

        let details = error.details().unwrap();
        assert_eq!(details["orphaned_artifact"]["identifier"], "42");
        assert_eq!(details["paper_id"], 7);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::ChainIncomplete { paper_id: 1 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::OutputTooLarge { size: 10, max: 5 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::External(external(502)).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
