//! Axum HTTP API server for the vpress job core.
//!
//! This crate is the transport shell around `vpress-worker`: multipart
//! upload intake, JSON remote intake, status polling, artifact download,
//! cancellation, and health/readiness probes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
