use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.server.max_upload_mb * 1024 * 1024 + UPLOAD_OVERHEAD_BYTES;

    let api_routes = Router::new()
        .route("/api/health", get(handlers::health::backend_health))
        .route(
            "/api/health/refresh",
            post(handlers::health::refresh_backend_health),
        )
        .route("/api/chat", post(handlers::chat::chat_handler))
        .route(
            "/api/chat/{session_id}/history",
            get(handlers::chat::history_handler),
        )
        .route("/api/documents", get(handlers::documents::list_documents))
        .route(
            "/api/documents/upload",
            post(handlers::documents::upload_document),
        )
        .route(
            "/api/documents/{document_id}/watch",
            get(handlers::documents::watch_document),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::chat::QueryResponse;
    use crate::models::document::{DocumentSummary, JobStatus, JobStatusReport, UploadReceipt};
    use crate::services::backend::{
        MockDocumentBackend, MockHealthBackend, MockJobStatusBackend, MockQueryBackend,
    };
    use crate::services::conversation::{ConversationCache, PruningPolicy};
    use crate::services::event_bus::SystemEvent;
    use crate::services::polling::{BackoffPolicy, JobOutcome};
    use crate::services::{ConversationManager, EventBus, HealthMonitor, JobWatchRegistry};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn document_backend() -> MockDocumentBackend {
        let mut docs = MockDocumentBackend::new();
        docs.expect_list_documents().returning(|| {
            Ok(vec![
                DocumentSummary {
                    id: "a".into(),
                    filename: "alice.pdf".into(),
                    status: JobStatus::Completed,
                    error_message: None,
                },
                DocumentSummary {
                    id: "b".into(),
                    filename: "bob.docx".into(),
                    status: JobStatus::Processing,
                    error_message: None,
                },
            ])
        });
        docs.expect_upload_document()
            .withf(|name, data| name == "cv.pdf" && !data.is_empty())
            .returning(|_, _| {
                Ok(UploadReceipt {
                    message: "Document uploaded".into(),
                    document_id: "doc-9".into(),
                })
            });
        docs
    }

    fn test_app() -> Router {
        let mut jobs = MockJobStatusBackend::new();
        jobs.expect_job_status()
            .returning(|_| Ok(JobStatusReport::new(JobStatus::Completed)));

        build_router(test_state(jobs))
    }

    fn test_state(jobs: MockJobStatusBackend) -> AppState {
        let mut query = MockQueryBackend::new();
        query.expect_query().returning(|req| {
            Ok(QueryResponse {
                response: format!("echo: {}", req.query),
            })
        });

        let mut health = MockHealthBackend::new();
        health.expect_health().returning(|| Ok(Default::default()));

        let shutdown = CancellationToken::new();
        let event_bus = Arc::new(EventBus::new(16));
        let documents = Arc::new(document_backend());

        AppState {
            settings: Arc::new(Settings::default()),
            conversation_manager: Arc::new(ConversationManager::new(
                ConversationCache::new(Duration::from_secs(60), 100.0),
                PruningPolicy::default(),
                Arc::new(query),
                documents.clone(),
            )),
            health_monitor: Arc::new(HealthMonitor::new(
                Arc::new(health),
                BackoffPolicy::default(),
                Duration::from_secs(30),
                shutdown.clone(),
            )),
            job_watches: Arc::new(JobWatchRegistry::new(
                Arc::new(jobs),
                Default::default(),
                event_bus.clone(),
                shutdown,
            )),
            documents,
            event_bus,
        }
    }

    /// Reports each job as processing on its first check and completed after.
    fn processing_then_completed() -> MockJobStatusBackend {
        let checks = std::sync::Mutex::new(std::collections::HashMap::<String, u32>::new());
        let mut jobs = MockJobStatusBackend::new();
        jobs.expect_job_status().returning(move |job_id| {
            let mut checks = checks.lock().unwrap();
            let count = checks.entry(job_id.to_string()).or_default();
            *count += 1;
            let status = if *count == 1 {
                JobStatus::Processing
            } else {
                JobStatus::Completed
            };
            Ok(JobStatusReport::new(status))
        });
        jobs
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "Who knows Rust?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["response"], "echo: Who knows Rust?");
        assert_eq!(body["context_pairs"], 0);

        let session_id = body["session_id"].as_str().unwrap().to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/chat/{}/history", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["turns"][0]["isUser"], true);
        assert_eq!(body["turns"][1]["text"], "echo: Who knows Rust?");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let response = test_app()
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "  "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "BadRequest");
    }

    #[tokio::test]
    async fn test_unknown_session_history_is_404() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/chat/nope/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_document_summary() {
        let response = test_app()
            .oneshot(Request::builder().uri("/api/documents").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["completed"], 1);
        assert_eq!(body["pending"], 1);
    }

    #[tokio::test]
    async fn test_backend_health_before_first_poll() {
        let response = test_app()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["outcome"], "pending");
        assert_eq!(body["attempt"], 0);
    }

    #[tokio::test]
    async fn test_upload_starts_watch() {
        let boundary = "X-CV-BOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cv.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF-1.4 test\r\n--{b}--\r\n",
            b = boundary
        );

        let response = test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/documents/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["document_id"], "doc-9");
        assert_eq!(body["watch_url"], "/api/documents/doc-9/watch");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_streams_progress_until_finished() {
        let state = test_state(processing_then_completed());
        let app = build_router(state.clone());

        let request = tokio::spawn(async move {
            let response = app.oneshot(get_request("/api/documents/doc-1/watch")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        // Events for other jobs must neither show up nor end the stream.
        state.event_bus.publish(SystemEvent::JobFinished {
            job_id: "other-job".into(),
            outcome: JobOutcome::Cancelled,
        });

        let body = request.await.unwrap();

        assert_eq!(body.matches("event: progress").count(), 2);
        assert_eq!(body.matches("event: finished").count(), 1);
        assert!(body.contains(r#""progress":50"#));
        assert!(body.contains(r#""progress":100"#));
        assert!(body.contains(r#""outcome":"completed""#));
        assert!(!body.contains("other-job"));
        assert!(body.find("event: finished") > body.rfind("event: progress"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_watch_stream_stops_its_watcher() {
        let mut jobs = MockJobStatusBackend::new();
        jobs.expect_job_status()
            .returning(|_| Ok(JobStatusReport::new(JobStatus::Processing)));
        let state = test_state(jobs);

        let response = build_router(state.clone())
            .oneshot(get_request("/api/documents/doc-1/watch"))
            .await
            .unwrap();
        assert!(state.job_watches.is_watching("doc-1"));

        drop(response);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!state.job_watches.is_watching("doc-1"));
        assert_eq!(state.job_watches.active_count(), 0);
    }
}
