use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::chat::{QueryRequest, SessionId, Turn};
use crate::models::document::JobStatus;
use crate::services::backend::{BackendError, DocumentBackend, QueryBackend};

use super::cache::{CacheStats, ConversationCache};
use super::context_builder::ContextWindowBuilder;
use super::pairs::PairBuilder;
use super::pruning::PruningPolicy;
use super::types::ConversationState;

pub const NO_DOCUMENTS_REPLY: &str =
    "I don't have any processed CV data to query. Please upload and process some documents first.";

pub const QUERY_ERROR_REPLY: &str =
    "I'm sorry, I encountered an error processing your query. Please try again.";

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Memory limit reached, cannot open a new session")]
    CapacityExceeded,

    #[error("Query failed for session {session_id}: {source}")]
    Query {
        session_id: SessionId,
        #[source]
        source: BackendError,
    },
}

/// Assistant answer to one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub response: String,
    /// Complete pairs sent to the backend as context
    pub context_pairs: usize,
}

/// Owns the chat sessions and runs each exchange against the backend.
pub struct ConversationManager {
    cache: ConversationCache,
    pruning: PruningPolicy,
    query_backend: Arc<dyn QueryBackend>,
    document_backend: Arc<dyn DocumentBackend>,
}

impl ConversationManager {
    pub fn new(
        cache: ConversationCache,
        pruning: PruningPolicy,
        query_backend: Arc<dyn QueryBackend>,
        document_backend: Arc<dyn DocumentBackend>,
    ) -> Self {
        Self {
            cache,
            pruning,
            query_backend,
            document_backend,
        }
    }

    /// Records the user message, queries the backend with the recent
    /// conversation as context and records the answer.
    ///
    /// Without a `session_id` a new session is opened. On a backend failure
    /// the apology turn is still recorded before the error is returned.
    pub async fn handle_message(
        &self,
        session_id: Option<SessionId>,
        message: String,
    ) -> Result<ChatReply, ConversationError> {
        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let handle = self
            .cache
            .get_or_insert_with(&session_id, || {
                ConversationState::new(session_id.clone(), self.pruning.clone())
            })
            .ok_or(ConversationError::CapacityExceeded)?;

        let mut state = handle.lock().await;

        // Pairs come from the history before this message is recorded.
        let pairs = PairBuilder::build_pairs(state.history.snapshot());
        state.record_turn(message.as_str(), true);

        if !self.has_processed_documents().await {
            info!("Session {}: no processed documents, skipping query", session_id);
            state.record_turn(NO_DOCUMENTS_REPLY, false);
            return Ok(ChatReply {
                session_id,
                response: NO_DOCUMENTS_REPLY.to_string(),
                context_pairs: 0,
            });
        }

        let window = ContextWindowBuilder::build(&pairs);
        debug!(
            "Session {}: querying with {} context pairs ({} chars)",
            session_id,
            window.pair_count,
            window.text.len()
        );

        state.metadata.total_queries += 1;
        let request = QueryRequest {
            query: message,
            context: window.text,
        };

        match self.query_backend.query(&request).await {
            Ok(answer) => {
                state.record_turn(answer.response.as_str(), false);
                Ok(ChatReply {
                    session_id,
                    response: answer.response,
                    context_pairs: window.pair_count,
                })
            }
            Err(source) => {
                warn!("Session {}: query failed: {}", session_id, source);
                state.metadata.failed_queries += 1;
                state.record_turn(QUERY_ERROR_REPLY, false);
                Err(ConversationError::Query { session_id, source })
            }
        }
    }

    /// False only when the backend confirms there is no completed document.
    async fn has_processed_documents(&self) -> bool {
        match self.document_backend.list_documents().await {
            Ok(documents) => documents
                .iter()
                .any(|doc| doc.status == JobStatus::Completed),
            Err(e) => {
                warn!("Could not list documents, querying anyway: {}", e);
                true
            }
        }
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, ConversationError> {
        let handle = self
            .cache
            .get(session_id)
            .ok_or_else(|| ConversationError::SessionNotFound(session_id.to_string()))?;

        let state = handle.lock().await;
        Ok(state.history.snapshot().to_vec())
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
