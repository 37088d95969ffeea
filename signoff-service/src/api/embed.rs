//! Signature embedding endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::artifacts::{Backend, DocumentRef, SignatureArtifact};
use crate::error::{ServiceError, ServiceResult};
use crate::service::{EmbedOutcome, PaperEmbedOutcome};

use super::{AppState, Caller};

/// Embed request: a stored document and its signers, leftmost slot first
#[derive(Deserialize)]
pub struct EmbedRequest {
    pub document: DocumentRef,
    #[serde(default)]
    pub signers: Vec<SignatureArtifact>,
}

#[derive(Deserialize)]
pub struct PaperEmbedRequest {
    pub author_id: i64,
}

/// Embed signatures into a document and store the result
pub async fn embed_handler<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(ctx): Caller,
    Json(request): Json<EmbedRequest>,
) -> ServiceResult<Json<EmbedOutcome>> {
    if request.document.identifier.is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "document.identifier is required".to_string(),
        });
    }
    if request.document.file_name.trim().is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "document.file_name is required".to_string(),
        });
    }

    let outcome = state
        .service
        .embed_and_persist(&ctx, &request.document, request.signers)
        .await?;
    Ok(Json(outcome))
}

/// Sign a paper with its author's and approvers' signatures
pub async fn embed_paper_handler<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(paper_id): Path<i64>,
    Caller(ctx): Caller,
    Json(request): Json<PaperEmbedRequest>,
) -> ServiceResult<Json<PaperEmbedOutcome>> {
    let outcome = state
        .service
        .embed_for_paper(&ctx, paper_id, request.author_id)
        .await?;
    Ok(Json(outcome))
}
