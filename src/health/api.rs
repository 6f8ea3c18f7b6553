//! Health HTTP API
//!
//! `GET /health` returns the liveness summary, with 503 when the root is dead.
//! `GET /health/live` only says the process answers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use super::HealthReporter;

/// Create the health router
pub fn create_router(reporter: HealthReporter) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/health/live", get(get_live))
        .with_state(reporter)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /health - Liveness summary of every task
async fn get_health(State(reporter): State<HealthReporter>) -> impl IntoResponse {
    let summary = reporter.snapshot();
    let status = if summary.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(summary))
}

/// GET /health/live - Process answers requests
async fn get_live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start the health server
pub async fn start_server(reporter: HealthReporter, port: u16) -> anyhow::Result<()> {
    let app = create_router(reporter);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "health API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::{Heartbeat, HeartbeatGroup};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn reporter() -> (HealthReporter, Arc<Heartbeat>, Arc<Heartbeat>) {
        let root = Arc::new(HeartbeatGroup::new("feeder"));
        let read = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let feed = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        root.add_heartbeat("readData", Arc::clone(&read)).unwrap();
        root.add_heartbeat("feedData", Arc::clone(&feed)).unwrap();
        (HealthReporter::new(root), read, feed)
    }

    #[tokio::test(start_paused = true)]
    async fn health_is_ok_when_every_task_is_alive() {
        let (reporter, read, feed) = reporter();
        read.mark_alive();
        feed.mark_alive();

        let (status, body) = get_json(create_router(reporter), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "live");
        assert_eq!(body["members"]["readData"]["status"], "live");
        assert_eq!(body["members"]["feedData"]["status"], "live");
    }

    #[tokio::test(start_paused = true)]
    async fn dead_task_turns_health_into_503_with_full_body() {
        let (reporter, read, feed) = reporter();
        read.mark_alive();
        feed.set_note("not_authorized");
        tokio::time::advance(Duration::from_secs(1)).await;

        let (status, body) = get_json(create_router(reporter), "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "dead");
        assert_eq!(body["members"]["readData"]["status"], "live");
        assert_eq!(body["members"]["feedData"]["status"], "dead");
        assert_eq!(body["members"]["feedData"]["note"], "not_authorized");
    }

    #[tokio::test(start_paused = true)]
    async fn live_probe_ignores_task_liveness() {
        let (reporter, _, _) = reporter();
        tokio::time::advance(Duration::from_secs(120)).await;

        let (status, body) = get_json(create_router(reporter), "/health/live").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
