//! Signing a paper once its approval chain is complete.
//!
//! The paper's author signs first, followed by every approver whose step is
//! checked, in step order.

use std::time::Instant;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::artifacts::{
    ApprovalStep, ArtifactRef, Backend, CallerContext, DocumentRef, SignatureArtifact, StepStatus,
};
use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::retry::with_retry;

use super::round_trip::EmbedOutcome;
use super::{SignoffService, record_round_trip};

#[derive(Debug, Clone, Serialize)]
pub struct PaperEmbedOutcome {
    pub paper_id: i64,
    #[serde(flatten)]
    pub embed: EmbedOutcome,
}

/// The chain is complete once its final step has been checked
pub fn chain_complete(steps: &[ApprovalStep]) -> bool {
    steps
        .iter()
        .any(|s| s.status == StepStatus::Checked && s.total_steps > 0 && s.step == s.total_steps)
}

/// Approver user IDs of checked steps, in step order
fn checked_approvers(steps: &[ApprovalStep]) -> Vec<i64> {
    let mut checked: Vec<&ApprovalStep> = steps
        .iter()
        .filter(|s| s.status == StepStatus::Checked)
        .collect();
    checked.sort_by_key(|s| s.step);
    checked.into_iter().map(|s| s.approver_id).collect()
}

impl<B: Backend> SignoffService<B> {
    /// Sign the paper's current document with its author's and approvers'
    /// signatures, then point the paper at the signed copy.
    pub async fn embed_for_paper(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
        author_id: i64,
    ) -> ServiceResult<PaperEmbedOutcome> {
        let started = Instant::now();
        let result = self.sign_paper(ctx, paper_id, author_id).await;
        record_round_trip(started, &result);
        result
    }

    async fn sign_paper(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
        author_id: i64,
    ) -> ServiceResult<PaperEmbedOutcome> {
        let steps = with_retry(&self.retry, "fetch approval steps", || {
            self.backend.approval_steps(ctx, paper_id)
        })
        .await?;
        if !chain_complete(&steps) {
            return Err(ServiceError::ChainIncomplete { paper_id });
        }

        let mut signer_ids = vec![author_id];
        signer_ids.extend(checked_approvers(&steps));
        let signatures =
            try_join_all(signer_ids.iter().map(|&user_id| self.signature_for(ctx, user_id)))
                .await?;

        let document = self.paper_document(ctx, paper_id).await?;
        info!(
            paper_id,
            signers = signatures.len(),
            file_name = %document.file_name,
            "Signing paper"
        );

        let embed = self.round_trip(ctx, &document, signatures).await?;

        let identifier = embed.artifact.identifier.as_str();
        let updated = with_retry(&self.retry, "update paper attachment", || {
            self.backend.update_paper_attachment(ctx, paper_id, identifier)
        })
        .await;
        if let Err(source) = updated {
            warn!(
                paper_id,
                orphaned = %embed.artifact.identifier,
                error = %format_error_chain(&source),
                "Signed document stored but paper record not updated"
            );
            return Err(ServiceError::PartialPersistence {
                paper_id,
                artifact: embed.artifact,
                source,
            });
        }

        info!(paper_id, attachment = %embed.artifact.identifier, "Paper now references signed document");
        Ok(PaperEmbedOutcome { paper_id, embed })
    }

    /// Signer's name and signature reference. A user without a signature
    /// on file still gets a slot.
    async fn signature_for(
        &self,
        ctx: &CallerContext,
        user_id: i64,
    ) -> ServiceResult<SignatureArtifact> {
        let user = with_retry(&self.retry, "fetch user", || self.backend.user(ctx, user_id)).await?;

        let identifier = match user.signature_attachment_id {
            Some(attachment_id) => {
                match with_retry(&self.retry, "fetch signature attachment", || {
                    self.backend.attachment(ctx, attachment_id)
                })
                .await
                {
                    Ok(attachment) => ArtifactRef::new(attachment.url),
                    Err(e) => {
                        warn!(
                            user_id,
                            attachment_id,
                            error = %format_error_chain(&e),
                            "Signature attachment unavailable"
                        );
                        ArtifactRef::default()
                    }
                }
            }
            None => ArtifactRef::default(),
        };

        Ok(SignatureArtifact {
            identifier,
            display_name: user.name,
        })
    }

    async fn paper_document(&self, ctx: &CallerContext, paper_id: i64) -> ServiceResult<DocumentRef> {
        let paper = with_retry(&self.retry, "fetch paper", || self.backend.paper(ctx, paper_id)).await?;
        let attachment = with_retry(&self.retry, "fetch paper attachment", || {
            self.backend.attachment(ctx, paper.attachment_id)
        })
        .await?;

        Ok(DocumentRef {
            identifier: ArtifactRef::new(attachment.url),
            file_name: attachment.file_name,
        })
    }
}
