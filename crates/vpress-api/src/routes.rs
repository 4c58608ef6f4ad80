//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{
    cancel_job, download_artifact, get_job, submit_remote, submit_upload,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let job_routes = Router::new()
        // Intake
        .route("/jobs", post(submit_upload))
        .route("/jobs/remote", post(submit_remote))
        // Polling
        .route("/jobs/:job_id", get(get_job))
        // Cancellation
        .route("/jobs/:job_id", delete(cancel_job))
        // Retrieval
        .route("/jobs/:job_id/download", get(download_artifact));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .nest("/api", job_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS layer from configured origins ("*" means any).
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::util::ServiceExt;
    use vpress_worker::WorkerConfig;

    async fn test_state(dir: &TempDir) -> AppState {
        let worker_config = WorkerConfig {
            input_dir: dir.path().join("in"),
            output_dir: dir.path().join("out"),
            retention_delay: Duration::from_secs(3600),
            ..WorkerConfig::default()
        };
        AppState::new(ApiConfig::default(), worker_config)
            .await
            .expect("state builds")
    }

    async fn get_status(router: Router, uri: &str) -> axum::http::StatusCode {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn test_health_route() {
        let dir = TempDir::new().unwrap();
        let router = create_router(test_state(&dir).await);
        assert_eq!(get_status(router, "/health").await, axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let dir = TempDir::new().unwrap();
        let router = create_router(test_state(&dir).await);
        assert_eq!(
            get_status(router.clone(), "/api/jobs/no-such-job").await,
            axum::http::StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(router, "/api/jobs/no-such-job/download").await,
            axum::http::StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_remote_intake_validation_is_400() {
        let dir = TempDir::new().unwrap();
        let router = create_router(test_state(&dir).await);

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/jobs/remote")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"url":"not a url"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cors_layer_with_explicit_origins() {
        let config = ApiConfig {
            cors_origins: vec!["https://app.example.com".to_string()],
            ..ApiConfig::default()
        };
        // builds without panicking on valid origins
        let _ = cors_layer(&config);
    }
}
