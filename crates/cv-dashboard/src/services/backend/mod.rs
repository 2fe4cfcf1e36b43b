//! Collaborator interfaces of the document/query backend.
//!
//! The conversation manager, the health poll and the job watchers only see
//! these traits; `BackendClient` is the REST implementation.

mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::chat::{QueryRequest, QueryResponse};
use crate::models::document::{DocumentSummary, JobStatusReport, UploadReceipt};
use crate::models::health::HealthStatus;

pub use client::BackendClient;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// The backend understood the request and refused it; asking again will
    /// not change the answer.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Status { status: 400 | 404, .. })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthBackend: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusBackend: Send + Sync {
    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, BackendError>;

    async fn upload_document(
        &self,
        file_name: String,
        data: Vec<u8>,
    ) -> Result<UploadReceipt, BackendError>;
}
