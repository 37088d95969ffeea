//! Wire types returned by the approval backend.

use serde::{Deserialize, Serialize};

use crate::artifacts::{ApprovalStep, AttachmentRecord, PaperRecord, StepStatus, UserRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStepResponse {
    pub step: u32,
    pub total_steps: u32,
    pub status: StepStatus,
    pub approver_id: i64,
}

impl From<ApprovalStepResponse> for ApprovalStep {
    fn from(r: ApprovalStepResponse) -> Self {
        Self {
            step: r.step,
            total_steps: r.total_steps,
            status: r.status,
            approver_id: r.approver_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub name: String,
    /// Signature attachment ID ("chữ ký")
    #[serde(rename = "chuKy", default)]
    pub chu_ky: Option<i64>,
}

impl From<UserResponse> for UserRecord {
    fn from(r: UserResponse) -> Self {
        Self {
            name: r.name,
            signature_attachment_id: r.chu_ky,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub url: String,
    #[serde(default)]
    pub file_name: String,
}

impl From<AttachmentResponse> for AttachmentRecord {
    fn from(r: AttachmentResponse) -> Self {
        Self {
            url: r.url,
            file_name: r.file_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperResponse {
    pub attachment_id: Option<i64>,
}

impl TryFrom<PaperResponse> for PaperRecord {
    type Error = String;

    fn try_from(r: PaperResponse) -> Result<Self, Self::Error> {
        r.attachment_id
            .map(|attachment_id| PaperRecord { attachment_id })
            .ok_or_else(|| "paper has no document attachment".to_string())
    }
}

/// Storage upload result
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Body for registering an uploaded file as an attachment
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAttachmentRequest<'a> {
    pub url: &'a str,
    pub file_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RegisteredAttachment {
    pub url: String,
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAttachmentRequest {
    pub attachment_id: serde_json::Value,
}
