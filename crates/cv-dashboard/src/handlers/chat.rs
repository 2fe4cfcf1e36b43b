use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::models::chat::{ChatRequest, ChatResponse, HistoryResponse};
use crate::services::ConversationManager;
use crate::utils::error::ApiError;

pub async fn chat_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(
        "Chat request: session={:?}, message_len={}",
        req.session_id,
        req.message.len()
    );

    let reply = manager.handle_message(req.session_id, req.message).await?;

    Ok(Json(ChatResponse {
        session_id: reply.session_id,
        response: reply.response,
        context_pairs: reply.context_pairs,
        timestamp: Utc::now(),
    }))
}

pub async fn history_handler(
    State(manager): State<Arc<ConversationManager>>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = manager.history(&session_id).await?;
    Ok(Json(HistoryResponse { session_id, turns }))
}
