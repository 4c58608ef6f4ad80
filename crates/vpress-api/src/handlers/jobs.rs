//! Job intake, status, download, and cancellation handlers.

use std::path::PathBuf;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeFile;
use tracing::warn;

use vpress_models::{CompressionStats, Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Intake response.
#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Remote intake request body.
#[derive(Deserialize)]
pub struct RemoteSubmitRequest {
    pub url: String,
    #[serde(default)]
    pub preset: Option<String>,
}

/// Job snapshot as exposed to clients.
///
/// Server-side paths stay out of the response; completed jobs carry the
/// transport-level download URL instead.
#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub preset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CompressionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobResponse {
    fn from_job(job: Job) -> Self {
        let download_url = (job.status == JobStatus::Completed)
            .then(|| format!("/api/jobs/{}/download", job.id));
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            preset: job.preset,
            stats: job.stats,
            error: job.error,
            download_url,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Intake for the direct-upload pipeline.
///
/// Multipart form: a `video` file part plus an optional `preset` text part.
/// The file is streamed to the input directory before the core intake runs.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut preset: Option<String> = None;
    let mut staged: Option<PathBuf> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("video") => {
                let path = state.service.stage_upload_path(field.file_name());
                let mut file = tokio::fs::File::create(&path).await?;
                loop {
                    let chunk = field
                        .chunk()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("upload interrupted: {e}")))?;
                    let Some(chunk) = chunk else { break };
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                staged = Some(path);
            }
            Some("preset") => {
                preset = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("invalid preset field: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let staged = staged.ok_or_else(|| ApiError::bad_request("missing 'video' file field"))?;

    match state.service.submit_upload(&staged, preset.as_deref()) {
        Ok(job_id) => Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id }))),
        Err(e) => {
            // the job was never created; don't leave the staged file behind
            if let Err(cleanup) = tokio::fs::remove_file(&staged).await {
                warn!("failed to remove rejected upload: {}", cleanup);
            }
            Err(e.into())
        }
    }
}

/// Intake for the remote-fetch pipeline.
pub async fn submit_remote(
    State(state): State<AppState>,
    Json(request): Json<RemoteSubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let job_id = state
        .service
        .submit_remote(&request.url, request.preset.as_deref())?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// Poll one job's status.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::from_string(job_id);
    state
        .service
        .status(&job_id)
        .map(JobResponse::from_job)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

/// Download a completed artifact.
///
/// A successful retrieval swaps the long retention timer for the short
/// post-download grace timer before the bytes go out.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::from_string(job_id);
    let path = state
        .service
        .artifact_path(&job_id)
        .ok_or_else(|| ApiError::not_found("Artifact not found"))?;

    let req = axum::http::Request::builder()
        .body(axum::body::Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    match ServeFile::new(path).try_call(req).await {
        Ok(response) => Ok(response.into_response()),
        Err(e) => Err(ApiError::internal(format!("Failed to serve artifact: {e}"))),
    }
}

/// Cancel a running job by killing its subprocess.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = JobId::from_string(job_id);
    if state.service.cancel(&job_id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::not_found("No running process for job"))
    }
}
