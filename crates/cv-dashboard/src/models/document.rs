use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Processing status of an uploaded document.
///
/// Moves forward only: `pending -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Progress percentage shown for each status.
    pub fn progress(self) -> u8 {
        match self {
            Self::Pending => 10,
            Self::Processing => 50,
            Self::Completed => 100,
            Self::Failed => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Response of the backend `/documents/status/{id}` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl JobStatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error_message: None,
        }
    }
}

/// Entry of the backend `/documents/list` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Response of the backend `/documents/upload` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    pub document_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: JobId,
    pub message: String,
    pub watch_url: String,
}

/// Document counts shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub documents: Vec<DocumentSummary>,
}

impl DashboardSummary {
    pub fn from_documents(documents: Vec<DocumentSummary>) -> Self {
        let count = |wanted: &[JobStatus]| {
            documents
                .iter()
                .filter(|doc| wanted.contains(&doc.status))
                .count()
        };

        Self {
            total: documents.len(),
            completed: count(&[JobStatus::Completed]),
            failed: count(&[JobStatus::Failed]),
            pending: count(&[JobStatus::Pending, JobStatus::Processing]),
            documents,
        }
    }
}
