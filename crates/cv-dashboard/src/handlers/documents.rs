use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::document::{DashboardSummary, UploadResponse};
use crate::services::backend::DocumentBackend;
use crate::services::event_bus::SystemEvent;
use crate::state::AppState;
use crate::utils::error::ApiError;

const ALLOWED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

pub async fn list_documents(
    State(documents): State<Arc<dyn DocumentBackend>>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let docs = documents.list_documents().await?;
    Ok(Json(DashboardSummary::from_documents(docs)))
}

fn validate_upload(file_name: &str, size: usize, max_bytes: usize) -> Result<(), ApiError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::BadRequest(
            "Invalid file type. Please upload a PDF or DOCX file.".to_string(),
        ));
    }
    if size == 0 {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if size > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "File is too large. Maximum size is {}MB.",
            max_bytes / 1024 / 1024
        )));
    }
    Ok(())
}

/// Forwards the file to the backend and starts watching its processing.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::BadRequest("filename required".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
            .to_vec();
        upload = Some((file_name, data));
    }

    let (file_name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("file required".to_string()))?;
    validate_upload(
        &file_name,
        data.len(),
        state.settings.server.max_upload_mb * 1024 * 1024,
    )?;

    info!("Uploading {} ({} bytes)", file_name, data.len());
    let receipt = state.documents.upload_document(file_name, data).await?;

    state.job_watches.watch(receipt.document_id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            watch_url: format!("/api/documents/{}/watch", receipt.document_id),
            document_id: receipt.document_id,
            message: receipt.message,
        }),
    ))
}

/// SSE stream of the job's progress, closed after its outcome.
pub async fn watch_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before starting a watcher so no event is missed.
    let mut events = state.event_bus.subscribe();

    // A watcher started here belongs to this stream: when the client goes
    // away the stream is dropped and the guard cancels it.
    let owned = state
        .job_watches
        .watch(document_id.clone())
        .map(|token| token.drop_guard());

    let stream = async_stream::stream! {
        let _owned = owned;
        loop {
            match events.recv().await {
                Ok(event) if event.job_id() == document_id => {
                    let finished = matches!(event, SystemEvent::JobFinished { .. });
                    yield Ok(create_sse_event(&event));
                    if finished {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Watch stream for {} skipped {} events", document_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn create_sse_event(event: &SystemEvent) -> Event {
    let data = match event {
        SystemEvent::JobProgress(progress) => serde_json::to_string(progress),
        SystemEvent::JobFinished { outcome, .. } => serde_json::to_string(outcome),
    };

    Event::default()
        .event(event.name())
        .data(data.unwrap_or_else(|_| "{}".to_string()))
}
