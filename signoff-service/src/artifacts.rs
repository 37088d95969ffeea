//! Artifact references, the compositing data model, and the external
//! collaborators the pipeline reads from and writes to.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::LazyLock;

use crate::backend::BackendError;

static BARE_FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{20,}$").expect("valid regex"));
static QUERY_FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id=([A-Za-z0-9_-]{20,})").expect("valid regex"));
static PATH_FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/d/([A-Za-z0-9_-]{20,})").expect("valid regex"));

/// Reference to a stored blob: a bare storage file ID or a URL carrying one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Extract the storage file ID.
    ///
    /// Accepts a bare ID, a URL with an `id=` query parameter, or a URL with a
    /// `/d/<id>` path segment.
    pub fn file_id(&self) -> Result<&str, BackendError> {
        let raw = self.0.trim();
        if BARE_FILE_ID.is_match(raw) {
            return Ok(raw);
        }
        QUERY_FILE_ID
            .captures(raw)
            .or_else(|| PATH_FILE_ID.captures(raw))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| BackendError::InvalidReference {
                reference: self.0.clone(),
            })
    }
}

impl From<&str> for ArtifactRef {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Source document bytes plus the file name they were uploaded under.
/// The name only drives the normalization policy.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Where to find a source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub identifier: ArtifactRef,
    pub file_name: String,
}

/// One approver's signature resource and the name printed in their slot.
/// Slots are filled in the order artifacts are supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureArtifact {
    #[serde(default)]
    pub identifier: ArtifactRef,
    pub display_name: String,
}

/// A persisted artifact as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub identifier: String,
    pub url: String,
}

/// Header naming the user on whose behalf a request is made, both on
/// incoming API requests and on calls to the backend
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Identity and credentials of the caller, threaded explicitly through every
/// external call
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub caller_identity: Option<String>,
    pub auth_token: Option<String>,
}

/// Approval state of one step in a paper's approval chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Checked,
    Pending,
    Rejected,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalStep {
    pub step: u32,
    pub total_steps: u32,
    pub status: StepStatus,
    pub approver_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub name: String,
    /// Attachment holding the user's signature image or PDF
    pub signature_attachment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub attachment_id: i64,
}

/// Blob storage: fetch bytes by reference, persist new artifacts.
///
/// Persisting takes two calls. An upload that succeeded must not be repeated
/// just because registering it failed.
pub trait ArtifactStore: Send + Sync {
    fn fetch_bytes(
        &self,
        ctx: &CallerContext,
        artifact: &ArtifactRef,
    ) -> impl Future<Output = Result<Vec<u8>, BackendError>> + Send;

    /// Put the bytes in storage, returning their storage URL
    fn upload_bytes(
        &self,
        ctx: &CallerContext,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    /// Record an uploaded file as an attachment
    fn register_upload(
        &self,
        ctx: &CallerContext,
        storage_url: &str,
        file_name: &str,
    ) -> impl Future<Output = Result<StoredArtifact, BackendError>> + Send;
}

/// Paper, approval-step, user and attachment records
pub trait PaperRecords: Send + Sync {
    fn approval_steps(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
    ) -> impl Future<Output = Result<Vec<ApprovalStep>, BackendError>> + Send;

    fn user(
        &self,
        ctx: &CallerContext,
        user_id: i64,
    ) -> impl Future<Output = Result<UserRecord, BackendError>> + Send;

    fn attachment(
        &self,
        ctx: &CallerContext,
        attachment_id: i64,
    ) -> impl Future<Output = Result<AttachmentRecord, BackendError>> + Send;

    fn paper(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
    ) -> impl Future<Output = Result<PaperRecord, BackendError>> + Send;

    /// Point the paper at a new document attachment
    fn update_paper_attachment(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
        attachment_identifier: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Everything the service needs from the outside world
pub trait Backend: ArtifactStore + PaperRecords + 'static {}

impl<T: ArtifactStore + PaperRecords + 'static> Backend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz_-09";

    #[test]
    fn test_bare_id() {
        assert_eq!(ArtifactRef::new(ID).file_id().unwrap(), ID);
        assert_eq!(
            ArtifactRef::new(format!("  {ID}\n")).file_id().unwrap(),
            ID
        );
    }

    #[test]
    fn test_query_parameter_id() {
        let url = format!(
            "https://drive.usercontent.google.com/download?id={ID}&export=download&authuser=0"
        );
        assert_eq!(ArtifactRef::new(url).file_id().unwrap(), ID);
    }

    #[test]
    fn test_path_segment_id() {
        let url = format!("https://drive.google.com/file/d/{ID}/view?usp=sharing");
        assert_eq!(ArtifactRef::new(url).file_id().unwrap(), ID);
    }

    #[test]
    fn test_invalid_reference() {
        for raw in ["", "short-id", "https://example.com/signature.png"] {
            let err = ArtifactRef::new(raw).file_id().unwrap_err();
            assert!(matches!(err, BackendError::InvalidReference { .. }), "{raw}");
        }
    }

    #[test]
    fn test_signature_artifact_defaults_identifier() {
        let artifact: SignatureArtifact =
            serde_json::from_str(r#"{"display_name": "Lê Văn C"}"#).unwrap();
        assert!(artifact.identifier.is_empty());
        assert_eq!(artifact.display_name, "Lê Văn C");
    }
}
