//! Approval backend client implementation.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::BackendError;
use super::responses::{
    ApprovalStepResponse, AttachmentResponse, PaperResponse, RegisterAttachmentRequest,
    RegisteredAttachment, UpdateAttachmentRequest, UploadResponse, UserResponse,
};
use crate::artifacts::{
    ApprovalStep, ArtifactRef, ArtifactStore, AttachmentRecord, CALLER_ID_HEADER, CallerContext,
    PaperRecord, PaperRecords, StoredArtifact, UserRecord,
};
use crate::config::BackendConfig;

/// REST client for the approval backend and its storage proxy
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("signoff-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, ctx: &CallerContext) -> RequestBuilder {
        let builder = match &ctx.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        match &ctx.caller_identity {
            Some(caller) => builder.header(CALLER_ID_HEADER, caller),
            None => builder,
        }
    }

    async fn checked(response: Response) -> Result<Response, BackendError> {
        if !response.status().is_success() {
            return Err(BackendError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &CallerContext,
        path: &str,
    ) -> Result<T, BackendError> {
        let response = self
            .authorized(self.client.get(self.url(path)), ctx)
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }
}

impl ArtifactStore for BackendClient {
    async fn fetch_bytes(
        &self,
        ctx: &CallerContext,
        artifact: &ArtifactRef,
    ) -> Result<Vec<u8>, BackendError> {
        let file_id = artifact.file_id()?;
        let url = self.url(&format!(
            "/api/gg-cloud/download?fileId={}",
            urlencoding::encode(file_id)
        ));

        let response = self.authorized(self.client.get(&url), ctx).send().await?;
        let bytes = Self::checked(response).await?.bytes().await?;
        debug!(file_id, size = bytes.len(), "Fetched artifact");
        Ok(bytes.to_vec())
    }

    async fn upload_bytes(
        &self,
        ctx: &CallerContext,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, BackendError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime::APPLICATION_PDF.as_ref())?;
        let form = Form::new().part("file", part);

        let response = self
            .authorized(self.client.post(self.url("/api/gg-cloud/upload")), ctx)
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::checked(response).await?.json().await?;
        if uploaded.url.is_empty() {
            return Err(BackendError::InvalidResponse {
                message: "storage upload returned no URL".to_string(),
            });
        }
        debug!(file_name, url = %uploaded.url, "Uploaded file");
        Ok(uploaded.url)
    }

    async fn register_upload(
        &self,
        ctx: &CallerContext,
        storage_url: &str,
        file_name: &str,
    ) -> Result<StoredArtifact, BackendError> {
        let response = self
            .authorized(self.client.post(self.url("/attachment/upload-paper")), ctx)
            .json(&RegisterAttachmentRequest {
                url: storage_url,
                file_name,
            })
            .send()
            .await?;
        let registered: RegisteredAttachment = Self::checked(response).await?.json().await?;

        Ok(StoredArtifact {
            identifier: registered.id.to_string(),
            url: registered.url,
        })
    }
}

impl PaperRecords for BackendClient {
    async fn approval_steps(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
    ) -> Result<Vec<ApprovalStep>, BackendError> {
        let steps: Vec<ApprovalStepResponse> = self
            .get_json(ctx, &format!("/approve-step/view-by-paper/{}", paper_id))
            .await?;
        Ok(steps.into_iter().map(Into::into).collect())
    }

    async fn user(&self, ctx: &CallerContext, user_id: i64) -> Result<UserRecord, BackendError> {
        let user: UserResponse = self
            .get_json(ctx, &format!("/user/view/{}", user_id))
            .await?;
        Ok(user.into())
    }

    async fn attachment(
        &self,
        ctx: &CallerContext,
        attachment_id: i64,
    ) -> Result<AttachmentRecord, BackendError> {
        let attachment: AttachmentResponse = self
            .get_json(ctx, &format!("/attachment/view/{}", attachment_id))
            .await?;
        Ok(attachment.into())
    }

    async fn paper(&self, ctx: &CallerContext, paper_id: i64) -> Result<PaperRecord, BackendError> {
        let paper: PaperResponse = self
            .get_json(ctx, &format!("/paper/view/{}", paper_id))
            .await?;
        PaperRecord::try_from(paper).map_err(|message| BackendError::InvalidResponse { message })
    }

    async fn update_paper_attachment(
        &self,
        ctx: &CallerContext,
        paper_id: i64,
        attachment_identifier: &str,
    ) -> Result<(), BackendError> {
        // The backend keys attachments by number; keep opaque identifiers as strings
        let attachment_id = attachment_identifier
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::from(attachment_identifier));

        let response = self
            .authorized(
                self.client
                    .put(self.url(&format!("/paper/update-attachment/{}", paper_id))),
                ctx,
            )
            .json(&UpdateAttachmentRequest { attachment_id })
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }
}
