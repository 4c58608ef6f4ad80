//! Application state.

use std::sync::Arc;

use vpress_worker::{JobService, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: Arc<JobService>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig, worker_config: WorkerConfig) -> anyhow::Result<Self> {
        let service = JobService::new(worker_config).await?;
        Ok(Self { config, service })
    }
}
