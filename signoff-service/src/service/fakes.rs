//! In-memory backend for service and API tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::artifacts::{
    ApprovalStep, ArtifactRef, ArtifactStore, AttachmentRecord, CallerContext, PaperRecord,
    PaperRecords, StoredArtifact, UserRecord,
};
use crate::backend::BackendError;
use crate::config::AppConfig;

/// Default configuration with near-instant retries
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 1;
    config
}

fn unavailable() -> BackendError {
    BackendError::Api {
        status: 503,
        message: "unavailable".to_string(),
    }
}

fn not_found(what: &str) -> BackendError {
    BackendError::Api {
        status: 404,
        message: format!("{what} not found"),
    }
}

/// Takes one injected failure if any remain
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    artifacts: HashMap<String, Vec<u8>>,
    steps: HashMap<i64, Vec<ApprovalStep>>,
    users: HashMap<i64, UserRecord>,
    attachments: HashMap<i64, AttachmentRecord>,
    papers: HashMap<i64, PaperRecord>,

    fetch_failures: AtomicU32,
    upload_failures: AtomicU32,
    register_failures: AtomicU32,
    update_failures: AtomicU32,

    fetch_calls: AtomicU32,
    upload_calls: AtomicU32,
    register_calls: AtomicU32,
    update_calls: AtomicU32,

    stored: Mutex<Vec<(String, Vec<u8>)>>,
    artifacts_out: Mutex<Vec<StoredArtifact>>,
    updates: Mutex<Vec<(i64, String)>>,
}

impl FakeBackend {
    pub fn with_artifact(mut self, identifier: &str, bytes: Vec<u8>) -> Self {
        self.artifacts.insert(identifier.to_string(), bytes);
        self
    }

    pub fn with_steps(mut self, paper_id: i64, steps: Vec<ApprovalStep>) -> Self {
        self.steps.insert(paper_id, steps);
        self
    }

    pub fn with_user(mut self, user_id: i64, name: &str, signature: Option<i64>) -> Self {
        self.users.insert(
            user_id,
            UserRecord {
                name: name.to_string(),
                signature_attachment_id: signature,
            },
        );
        self
    }

    /// Attachment `attachment_id` pointing at artifact `url`
    pub fn with_attachment(mut self, attachment_id: i64, url: &str, file_name: &str) -> Self {
        self.attachments.insert(
            attachment_id,
            AttachmentRecord {
                url: url.to_string(),
                file_name: file_name.to_string(),
            },
        );
        self
    }

    pub fn with_paper(mut self, paper_id: i64, attachment_id: i64) -> Self {
        self.papers.insert(paper_id, PaperRecord { attachment_id });
        self
    }

    pub fn failing_fetches(self, count: u32) -> Self {
        self.fetch_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_uploads(self, count: u32) -> Self {
        self.upload_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_registrations(self, count: u32) -> Self {
        self.register_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_updates(self, count: u32) -> Self {
        self.update_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Successfully uploaded `(file_name, bytes)` pairs
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn last_artifact(&self) -> Option<StoredArtifact> {
        self.artifacts_out.lock().unwrap().last().cloned()
    }

    pub fn updates(&self) -> Vec<(i64, String)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ArtifactStore for FakeBackend {
    async fn fetch_bytes(
        &self,
        _ctx: &CallerContext,
        artifact: &ArtifactRef,
    ) -> Result<Vec<u8>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fetch_failures) {
            return Err(unavailable());
        }
        self.artifacts
            .get(artifact.as_str())
            .cloned()
            .ok_or_else(|| not_found("artifact"))
    }

    async fn upload_bytes(
        &self,
        _ctx: &CallerContext,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.upload_failures) {
            return Err(unavailable());
        }

        let mut stored = self.stored.lock().unwrap();
        stored.push((file_name.to_string(), bytes));
        Ok(format!("https://storage.example/d/upload-{}", stored.len()))
    }

    async fn register_upload(
        &self,
        _ctx: &CallerContext,
        storage_url: &str,
        _file_name: &str,
    ) -> Result<StoredArtifact, BackendError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.register_failures) {
            return Err(unavailable());
        }

        let mut registered = self.artifacts_out.lock().unwrap();
        let artifact = StoredArtifact {
            identifier: (1001 + registered.len()).to_string(),
            url: storage_url.to_string(),
        };
        registered.push(artifact.clone());
        Ok(artifact)
    }
}

impl PaperRecords for FakeBackend {
    async fn approval_steps(
        &self,
        _ctx: &CallerContext,
        paper_id: i64,
    ) -> Result<Vec<ApprovalStep>, BackendError> {
        Ok(self.steps.get(&paper_id).cloned().unwrap_or_default())
    }

    async fn user(&self, _ctx: &CallerContext, user_id: i64) -> Result<UserRecord, BackendError> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| not_found("user"))
    }

    async fn attachment(
        &self,
        _ctx: &CallerContext,
        attachment_id: i64,
    ) -> Result<AttachmentRecord, BackendError> {
        self.attachments
            .get(&attachment_id)
            .cloned()
            .ok_or_else(|| not_found("attachment"))
    }

    async fn paper(&self, _ctx: &CallerContext, paper_id: i64) -> Result<PaperRecord, BackendError> {
        self.papers
            .get(&paper_id)
            .cloned()
            .ok_or_else(|| not_found("paper"))
    }

    async fn update_paper_attachment(
        &self,
        _ctx: &CallerContext,
        paper_id: i64,
        attachment_identifier: &str,
    ) -> Result<(), BackendError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.update_failures) {
            return Err(unavailable());
        }
        self.updates
            .lock()
            .unwrap()
            .push((paper_id, attachment_identifier.to_string()));
        Ok(())
    }
}
