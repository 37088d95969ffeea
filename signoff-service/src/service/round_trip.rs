//! Fetch, normalize, composite and persist one document.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::artifacts::{
    Backend, CallerContext, DocumentRef, SignatureArtifact, SourceDocument, StoredArtifact,
};
use crate::compositing::{SlotReport, resolve_signatures};
use crate::error::{ExternalCallError, ServiceError, ServiceResult};
use crate::retry::with_retry;

use super::{SignoffService, blocking, record_round_trip};

/// The persisted signed document and what happened in each slot
#[derive(Debug, Clone, Serialize)]
pub struct EmbedOutcome {
    #[serde(flatten)]
    pub artifact: StoredArtifact,
    pub slots: Vec<SlotReport>,
}

impl<B: Backend> SignoffService<B> {
    /// Embed `signatures` into the document behind `document` and store the
    /// result as a new artifact. The source artifact is never modified.
    pub async fn embed_and_persist(
        &self,
        ctx: &CallerContext,
        document: &DocumentRef,
        signatures: Vec<SignatureArtifact>,
    ) -> ServiceResult<EmbedOutcome> {
        let started = Instant::now();
        let result = self.round_trip(ctx, document, signatures).await;
        record_round_trip(started, &result);
        result
    }

    pub(super) async fn round_trip(
        &self,
        ctx: &CallerContext,
        document: &DocumentRef,
        signatures: Vec<SignatureArtifact>,
    ) -> ServiceResult<EmbedOutcome> {
        if signatures.len() > self.limits.max_signers {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "{} signers requested, at most {} are supported",
                    signatures.len(),
                    self.limits.max_signers
                ),
            });
        }

        info!(
            document = document.identifier.as_str(),
            file_name = %document.file_name,
            signers = signatures.len(),
            "Starting signature round trip"
        );

        let source = with_retry(&self.retry, "fetch source document", || {
            self.backend.fetch_bytes(ctx, &document.identifier)
        })
        .await?;
        debug!(size = source.len(), "Fetched source document");

        let normalizer = self.normalizer.clone();
        let source = SourceDocument {
            bytes: source,
            file_name: document.file_name.clone(),
        };
        let normalized = blocking(move || Ok(normalizer.normalize(source)?)).await?;

        let resolved =
            resolve_signatures(self.backend.as_ref(), ctx, &self.retry, signatures).await;

        let compositor = self.compositor.clone();
        let composite = blocking(move || Ok(compositor.composite(normalized, resolved)?)).await?;

        let size = composite.bytes.len() as u64;
        if size > self.limits.max_output_size_bytes {
            return Err(ServiceError::OutputTooLarge {
                size,
                max: self.limits.max_output_size_bytes,
            });
        }

        let file_name = pdf_file_name(&document.file_name);
        let artifact = self.store_bytes(ctx, composite.bytes, &file_name).await?;

        info!(
            identifier = %artifact.identifier,
            file_name = %file_name,
            size,
            "Stored signed document"
        );
        Ok(EmbedOutcome {
            artifact,
            slots: composite.slots,
        })
    }

    /// Persist a new artifact. Upload and registration are retried
    /// separately, so a failed registration never re-uploads the file.
    async fn store_bytes(
        &self,
        ctx: &CallerContext,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<StoredArtifact, ExternalCallError> {
        let storage_url = with_retry(&self.retry, "upload signed document", || {
            self.backend.upload_bytes(ctx, bytes.clone(), file_name)
        })
        .await?;
        with_retry(&self.retry, "register signed document", || {
            self.backend.register_upload(ctx, &storage_url, file_name)
        })
        .await
    }
}

/// Upload name for the signed document: the source name with a `.pdf`
/// extension
fn pdf_file_name(source_name: &str) -> String {
    Path::new(source_name)
        .file_name()
        .map(|name| Path::new(name).with_extension("pdf"))
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}
