//! Boundary operations consumed by the transport layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use url::Url;

use vpress_media::{probe_tool, ProcessTable};
use vpress_models::{Job, JobId, JobSource, JobStatus, Preset, PresetCatalog};
use vpress_registry::{JobRegistry, RetentionScheduler};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{run_job, PipelineContext};

/// Result of probing one external tool.
#[derive(Debug, Clone)]
pub struct ToolCheck {
    pub tool: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Aggregate health of the external tools.
#[derive(Debug, Clone)]
pub struct Health {
    pub degraded: bool,
    pub checks: Vec<ToolCheck>,
}

/// The job orchestration service.
///
/// Owns the three shared stores (job registry, process table, retention
/// timer table) plus the admission semaphore; the transport layer talks to
/// the core exclusively through this type. Intake returns the job id
/// immediately; a spawned worker task owns the pipeline and reports back
/// only through the registry.
pub struct JobService {
    ctx: Arc<PipelineContext>,
    catalog: PresetCatalog,
    slots: Arc<Semaphore>,
}

impl JobService {
    /// Create the service, its stores, and the background sweeper.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Arc<Self>> {
        tokio::fs::create_dir_all(&config.input_dir).await?;
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let registry = Arc::new(JobRegistry::new());
        let retention = Arc::new(RetentionScheduler::new(Arc::clone(&registry)));
        let processes = Arc::new(ProcessTable::new());
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        let service = Arc::new(Self {
            ctx: Arc::new(PipelineContext {
                config,
                registry,
                processes,
                retention,
            }),
            catalog: PresetCatalog::builtin(),
            slots,
        });

        service.spawn_sweeper();
        Ok(service)
    }

    /// Intake for the direct-upload pipeline. Returns immediately.
    ///
    /// `source_path` must already be staged on local disk by the transport.
    pub fn submit_upload(
        &self,
        source_path: impl Into<PathBuf>,
        preset_name: Option<&str>,
    ) -> WorkerResult<JobId> {
        let source_path = source_path.into();
        let meta = std::fs::metadata(&source_path)
            .map_err(|_| WorkerError::validation("upload source file is missing"))?;
        if meta.len() == 0 {
            return Err(WorkerError::validation("upload source file is empty"));
        }

        let preset = self.catalog.resolve(preset_name).clone();
        let id = JobId::new();
        self.ctx.registry.create(Job::new(
            id.clone(),
            JobSource::Upload { path: source_path },
            &preset.name,
        ));
        info!(job_id = %id, preset = %preset.name, "accepted upload job");

        self.spawn_pipeline(id.clone(), preset);
        Ok(id)
    }

    /// Intake for the remote-fetch pipeline. Returns immediately.
    pub fn submit_remote(&self, url: &str, preset_name: Option<&str>) -> WorkerResult<JobId> {
        let parsed = Url::parse(url).map_err(|_| WorkerError::validation("invalid video URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WorkerError::validation("video URL must be http or https"));
        }

        let preset = self.catalog.resolve(preset_name).clone();
        let id = JobId::new();
        self.ctx.registry.create(Job::new(
            id.clone(),
            JobSource::Remote {
                url: url.to_string(),
            },
            &preset.name,
        ));
        info!(job_id = %id, preset = %preset.name, url = %url, "accepted remote job");

        self.spawn_pipeline(id.clone(), preset);
        Ok(id)
    }

    /// Spawn the owned worker task for one job, gated by the admission
    /// semaphore.
    ///
    /// A panic inside the pipeline is caught at the join boundary and
    /// converted into a terminal failure; it never takes the process down.
    fn spawn_pipeline(&self, id: JobId, preset: Preset) {
        let ctx = Arc::clone(&self.ctx);
        let slots = Arc::clone(&self.slots);

        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // semaphore is only closed at shutdown
                    ctx.registry
                        .update(&id, |job| job.fail("Server is shutting down"));
                    return;
                }
            };

            let run = tokio::spawn(run_job(Arc::clone(&ctx), id.clone(), preset));
            if let Err(e) = run.await {
                error!(job_id = %id, "pipeline task aborted: {}", e);
                ctx.registry
                    .update(&id, |job| job.fail("Internal processing error"));
            }
        });
    }

    /// Snapshot of a job, if known.
    pub fn status(&self, id: &JobId) -> Option<Job> {
        self.ctx.registry.get(id)
    }

    /// Resolve the artifact path for a completed job.
    ///
    /// A successful retrieval replaces the long retention timer with the
    /// short post-download grace timer (arming has replace semantics, so
    /// cancel + re-arm happens atomically under the timer lock).
    pub fn artifact_path(&self, id: &JobId) -> Option<PathBuf> {
        let job = self.ctx.registry.get(id)?;
        if job.status != JobStatus::Completed {
            return None;
        }
        let path = job.output_path?;
        if !path.exists() {
            return None;
        }

        self.ctx
            .retention
            .arm(path.clone(), self.ctx.config.grace_delay, Some(id.clone()));
        Some(path)
    }

    /// Cancel a job by terminating its running subprocess.
    ///
    /// This is the only cancellation path; the pipeline observes the kill
    /// and drives the job to `Failed`. Returns false when the job has no
    /// running process.
    pub fn cancel(&self, id: &JobId) -> bool {
        self.ctx.processes.cancel(id)
    }

    /// Number of currently running external processes.
    pub fn active_processes(&self) -> usize {
        self.ctx.processes.active_count()
    }

    /// Number of tracked jobs.
    pub fn job_count(&self) -> usize {
        self.ctx.registry.len()
    }

    /// Where the transport should stage an incoming upload.
    pub fn stage_upload_path(&self, original_name: Option<&str>) -> PathBuf {
        let ext = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("mp4");
        self.ctx.config.input_dir.join(format!(
            "upload-{}.{}",
            uuid::Uuid::new_v4(),
            ext.to_ascii_lowercase()
        ))
    }

    /// Probe both external tools with a trivial version query.
    pub async fn health(&self) -> Health {
        let probes = [
            (self.ctx.config.ffmpeg_bin.clone(), "-version"),
            (self.ctx.config.ytdlp_bin.clone(), "--version"),
        ];

        let mut checks = Vec::with_capacity(probes.len());
        for (tool, version_arg) in probes {
            let check = match probe_tool(&tool, version_arg).await {
                Ok(()) => ToolCheck {
                    tool,
                    ok: true,
                    error: None,
                },
                Err(e) => ToolCheck {
                    tool,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            checks.push(check);
        }

        Health {
            degraded: checks.iter().any(|c| !c.ok),
            checks,
        }
    }

    /// Periodically evict terminal jobs that nobody polled past completion,
    /// so the job table cannot grow without bound when clients vanish.
    fn spawn_sweeper(&self) {
        let registry = Arc::clone(&self.ctx.registry);
        let interval = self.ctx.config.sweep_interval;
        let ttl = chrono::Duration::from_std(self.ctx.config.job_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(2));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - ttl;
                let stale = registry.stale_terminal_ids(cutoff);
                if stale.is_empty() {
                    continue;
                }
                for id in &stale {
                    registry.remove(id);
                }
                info!("Evicted {} forgotten terminal jobs", stale.len());
            }
        });
    }
}
