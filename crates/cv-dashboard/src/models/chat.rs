use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;

/// One message of a chat transcript.
///
/// Immutable once created. Serializes as `{"text": ..., "isUser": ...}`,
/// which is also the form whose byte length the pruning policy measures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    text: String,
    is_user: bool,
}

impl Turn {
    pub fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            text: text.into(),
            is_user,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_user(&self) -> bool {
        self.is_user
    }
}

/// A user question matched with the assistant answer that followed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaPair {
    pub user: String,
    pub assistant: Option<String>,
}

impl QaPair {
    pub fn answered(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: Some(assistant.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.assistant.is_some()
    }
}

// ===== QUERY BACKEND WIRE MODELS =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

// ===== GATEWAY REQUEST/RESPONSE MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub response: String,
    pub context_pairs: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: SessionId,
    pub turns: Vec<Turn>,
}
