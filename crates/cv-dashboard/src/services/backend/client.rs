use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::models::chat::{QueryRequest, QueryResponse};
use crate::models::document::{DocumentSummary, JobStatusReport, UploadReceipt};
use crate::models::health::HealthStatus;

use super::{BackendError, DocumentBackend, HealthBackend, JobStatusBackend, QueryBackend};

/// REST client for the document/query backend.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// URL of `/documents/status/{job_id}` with the id percent-encoded as a
    /// single path segment.
    fn status_url(&self, job_id: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::Transport(format!("Invalid backend URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Transport(format!("Invalid backend URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["documents", "status", job_id]);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.fetch(self.url(path)).await
    }

    async fn fetch<T: DeserializeOwned>(&self, url: impl AsRef<str>) -> Result<T, BackendError> {
        let url = url.as_ref();
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Self::decode(response).await
    }
}

#[async_trait]
impl QueryBackend for BackendClient {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, BackendError> {
        debug!(
            "Querying backend: query_len={}, context_len={}",
            request.query.len(),
            request.context.len()
        );

        let response = self
            .client
            .post(self.url("/queries/query"))
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Self::decode(response).await
    }
}

#[async_trait]
impl HealthBackend for BackendClient {
    async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.get("/health/").await
    }
}

#[async_trait]
impl JobStatusBackend for BackendClient {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, BackendError> {
        self.fetch(self.status_url(job_id)?).await
    }
}

#[async_trait]
impl DocumentBackend for BackendClient {
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, BackendError> {
        self.get("/documents/list").await
    }

    async fn upload_document(
        &self,
        file_name: String,
        data: Vec<u8>,
    ) -> Result<UploadReceipt, BackendError> {
        debug!("Forwarding upload {} ({} bytes)", file_name, data.len());

        let form = Form::new().part("file", Part::bytes(data).file_name(file_name));
        let response = self
            .client
            .post(self.url("/documents/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Self::decode(response).await
    }
}
