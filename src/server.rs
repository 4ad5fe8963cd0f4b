//! Trigger endpoint.
//!
//! `POST /webhook` validates `{action, recordId}` and enqueues the task; it
//! never runs pipeline work inline. `GET /health` reports liveness.

use crate::error::{NarratorError, Result};
use crate::pipeline::{QueueHandle, TriggerEvent};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, response::IntoResponse};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    queue: QueueHandle,
    workers: usize,
}

/// Build the endpoint router over a running queue.
pub fn router(queue: QueueHandle, workers: usize) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(Arc::new(AppState { queue, workers }))
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NarratorError::Other(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!(addr = %addr, "trigger endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}

fn error_body(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

async fn webhook(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return error_body(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let event = match TriggerEvent::from_json(&payload) {
        Ok(event) => event,
        Err(rejection) => {
            tracing::warn!(reason = rejection.message(), "rejected trigger");
            return error_body(StatusCode::BAD_REQUEST, rejection.message());
        }
    };

    let action = event.action;
    let record_id = event.record_id.clone();
    match state.queue.submit(event) {
        Ok(()) => {
            tracing::info!(%action, record_id = %record_id, "task queued");
            (StatusCode::ACCEPTED, Json(json!({ "status": "Task queued" })))
        }
        Err(NarratorError::Queue { message }) => {
            tracing::warn!(%action, record_id = %record_id, reason = %message, "trigger not queued");
            error_body(StatusCode::SERVICE_UNAVAILABLE, &message)
        }
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version_string(),
        "workers": state.workers,
        "pending": state.queue.pending(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::pipeline::WorkQueue;
    use crate::pipeline::services::mock_services;
    use crate::publish::MemoryStorage;
    use crate::record::InMemoryGateway;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn start_queue(root: &TempDir) -> WorkQueue {
        let services = mock_services(
            Arc::new(InMemoryGateway::new()),
            Arc::new(MemoryStorage::new()),
            root.path(),
        );
        WorkQueue::start(
            Arc::new(services),
            tokio::runtime::Handle::current(),
            &QueueConfig {
                workers: 1,
                capacity: 4,
                chain_merge: false,
            },
        )
        .unwrap()
    }

    async fn post_webhook(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_valid_trigger_is_accepted() {
        let root = TempDir::new().unwrap();
        let queue = start_queue(&root);
        let app = router(queue.handle(), 1);

        let (status, body) =
            post_webhook(app, r#"{"action":"generateAudioVideo","recordId":"rec1"}"#).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({ "status": "Task queued" }));
        let report = tokio::task::spawn_blocking(move || {
            let report = queue.reports().recv_timeout(std::time::Duration::from_secs(10));
            let _ = queue.shutdown();
            report
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.record_id, "rec1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_fields_and_bad_action_are_rejected() {
        let root = TempDir::new().unwrap();
        let queue = start_queue(&root);
        let app = router(queue.handle(), 1);

        let (status, body) = post_webhook(app.clone(), r#"{"action":"generateAudioVideo"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing action or recordId" }));

        let (status, body) =
            post_webhook(app.clone(), r#"{"action":"deleteAll","recordId":"rec1"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid action" }));

        let (status, body) = post_webhook(app, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid JSON" }));

        let reports = queue.reports();
        tokio::task::spawn_blocking(move || queue.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_queue_is_service_unavailable() {
        let root = TempDir::new().unwrap();
        let queue = start_queue(&root);
        let handle = queue.handle();
        tokio::task::spawn_blocking(move || queue.shutdown())
            .await
            .unwrap()
            .unwrap();

        let (status, body) = post_webhook(
            router(handle, 1),
            r#"{"action":"mergeAudioVideo","recordId":"rec1"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "error": "Queue closed" }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health() {
        let root = TempDir::new().unwrap();
        let queue = start_queue(&root);
        let app = router(queue.handle(), 3);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["workers"], 3);
        tokio::task::spawn_blocking(move || queue.shutdown())
            .await
            .unwrap()
            .unwrap();
    }
}
