//! Job pipelines.
//!
//! Two pipelines drive a job to its terminal state: direct-upload-compress,
//! and remote-fetch-then-conditionally-compress. Every step failure deletes
//! the files that step produced or consumed and resolves into the single
//! terminal `Failed` write; full tool diagnostics stay in the server logs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vpress_media::{
    fetch_remote, move_file, remove_file_if_exists, FfmpegCommand, ProcessTable, ProgressParser,
    ToolRunner,
};
use vpress_models::{CompressionStats, JobId, JobSource, JobStatus, Preset};
use vpress_registry::{JobRegistry, RetentionScheduler};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Progress written on entry to the compressing state.
pub const COMPRESS_START_PROGRESS: u8 = 5;

/// Everything a pipeline run needs, injected once at service construction.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub registry: Arc<JobRegistry>,
    pub processes: Arc<ProcessTable>,
    pub retention: Arc<RetentionScheduler>,
}

impl PipelineContext {
    /// Final artifact location for a job.
    pub fn output_path(&self, id: &JobId) -> PathBuf {
        self.config.output_dir.join(format!("{id}.mp4"))
    }

    /// Intermediate location for a fetched remote source.
    fn fetch_path(&self, id: &JobId) -> PathBuf {
        self.config.input_dir.join(format!("{id}.fetch.mp4"))
    }
}

struct PipelineOutcome {
    output_path: PathBuf,
    stats: CompressionStats,
}

/// Drive one job to its terminal state.
///
/// The job must already exist in the registry; the single terminal write
/// (success or failure) happens here and nowhere else in the happy path.
pub async fn run_job(ctx: Arc<PipelineContext>, id: JobId, preset: Preset) {
    let Some(job) = ctx.registry.get(&id) else {
        return;
    };

    let operation = match job.source {
        JobSource::Upload { .. } => "upload",
        JobSource::Remote { .. } => "remote",
    };
    let log = JobLogger::new(&id, operation);

    let result = match job.source {
        JobSource::Upload { path } => run_upload(&ctx, &id, &path, &preset, &log).await,
        JobSource::Remote { url } => run_remote(&ctx, &id, &url, &preset, &log).await,
    };

    match result {
        Ok(outcome) => {
            let stats = outcome.stats;
            ctx.registry
                .update(&id, |job| job.complete(outcome.output_path.clone(), stats));
            ctx.retention
                .arm(outcome.output_path, ctx.config.retention_delay, Some(id.clone()));
            log.completed(&format!(
                "artifact ready ({} bytes, {:.1}% smaller)",
                stats.compressed_bytes, stats.reduction_percent
            ));
        }
        Err(e) => {
            // full detail server-side, generic message to the client
            log.failed(&e.to_string());
            ctx.registry.update(&id, |job| job.fail(e.client_message()));
        }
    }
}

/// Direct-upload pipeline: the staged upload is always transcoded.
async fn run_upload(
    ctx: &PipelineContext,
    id: &JobId,
    input: &Path,
    preset: &Preset,
    log: &JobLogger,
) -> WorkerResult<PipelineOutcome> {
    let original_bytes = file_size(input).await?;
    log.start(&format!(
        "compressing {} byte upload with preset '{}'",
        original_bytes, preset.name
    ));

    ctx.registry.update(id, |job| {
        job.set_status(JobStatus::Compressing);
        job.set_progress(COMPRESS_START_PROGRESS);
    });

    let output = ctx.output_path(id);
    let result = compress(ctx, id, input, &output, preset).await;

    // The uploaded input goes away regardless of the transcode outcome.
    if let Err(e) = remove_file_if_exists(input).await {
        log.warning(&format!("failed to remove upload input: {e}"));
    }

    if let Err(e) = result {
        // ffmpeg can leave a truncated output behind after a kill
        remove_file_if_exists(&output).await.ok();
        return Err(e);
    }

    let compressed_bytes = file_size(&output).await?;
    Ok(PipelineOutcome {
        output_path: output,
        stats: CompressionStats::from_sizes(original_bytes, compressed_bytes),
    })
}

/// Remote pipeline: fetch, then transcode only when the fetched file is over
/// the selected preset's size ceiling.
async fn run_remote(
    ctx: &PipelineContext,
    id: &JobId,
    url: &str,
    preset: &Preset,
    log: &JobLogger,
) -> WorkerResult<PipelineOutcome> {
    log.start(&format!("fetching {url} with preset '{}'", preset.name));

    ctx.registry
        .update(id, |job| job.set_status(JobStatus::Fetching));

    let fetched = ctx.fetch_path(id);
    let runner =
        ToolRunner::new(Arc::clone(&ctx.processes)).with_timeout(ctx.config.download_timeout);

    if let Err(e) = fetch_remote(
        &runner,
        id,
        &ctx.config.ytdlp_bin,
        url,
        &fetched,
        preset.max_height,
    )
    .await
    {
        remove_file_if_exists(&fetched).await.ok();
        return Err(e.into());
    }

    let fetched_bytes = file_size(&fetched).await?;
    let output = ctx.output_path(id);

    if fetched_bytes <= preset.max_output_bytes {
        // Already within the preset ceiling: serve the fetch as-is.
        log.step(&format!(
            "fetched {} bytes, under the {} byte ceiling; skipping transcode",
            fetched_bytes, preset.max_output_bytes
        ));
        if let Err(e) = move_file(&fetched, &output).await {
            remove_file_if_exists(&fetched).await.ok();
            return Err(e.into());
        }
        return Ok(PipelineOutcome {
            output_path: output,
            stats: CompressionStats::pass_through(fetched_bytes),
        });
    }

    log.step(&format!(
        "fetched {} bytes, over the {} byte ceiling; transcoding",
        fetched_bytes, preset.max_output_bytes
    ));

    ctx.registry.update(id, |job| {
        job.set_status(JobStatus::Compressing);
        job.set_progress(COMPRESS_START_PROGRESS);
    });

    let result = compress(ctx, id, &fetched, &output, preset).await;

    // The fetched intermediate goes away regardless of the transcode outcome.
    if let Err(e) = remove_file_if_exists(&fetched).await {
        log.warning(&format!("failed to remove fetched intermediate: {e}"));
    }

    if let Err(e) = result {
        remove_file_if_exists(&output).await.ok();
        return Err(e);
    }

    let compressed_bytes = file_size(&output).await?;
    Ok(PipelineOutcome {
        output_path: output,
        stats: CompressionStats::from_sizes(fetched_bytes, compressed_bytes),
    })
}

/// Run the transcoder for one job with progress wired into the registry.
async fn compress(
    ctx: &PipelineContext,
    id: &JobId,
    input: &Path,
    output: &Path,
    preset: &Preset,
) -> WorkerResult<()> {
    let cmd = FfmpegCommand::new(input, output)
        .video_filter(preset.scale_filter())
        .frame_rate(preset.frame_rate)
        .output_args(preset.to_ffmpeg_args());
    let args = cmd.build_args();

    let runner =
        ToolRunner::new(Arc::clone(&ctx.processes)).with_timeout(ctx.config.transcode_timeout);

    let registry = Arc::clone(&ctx.registry);
    let job_id = id.clone();
    let mut parser = ProgressParser::new();

    runner
        .run(id, &ctx.config.ffmpeg_bin, &args, move |line| {
            if let Some(pct) = parser.feed_line(line) {
                // rejected automatically once the job is terminal
                registry.update(&job_id, |job| job.set_progress(pct));
            }
        })
        .await?;

    Ok(())
}

async fn file_size(path: &Path) -> WorkerResult<u64> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use vpress_models::Job;

    /// Fake transcoder: emits a duration and one progress marker, then
    /// writes a 100-byte output (input after -i, output as the last arg).
    const COMPRESSING_FFMPEG: &str = r#"in=""
prev=""
out=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"
  out="$a"
done
echo "Duration: 00:00:10.00, start: 0.000000" >&2
echo "out_time_us=5000000" >&2
head -c 100 "$in" > "$out""#;

    /// Fake downloader: writes 500 zero bytes to the path following -o.
    const FETCHING_YTDLP: &str = r#"prev=""
out=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
head -c 500 /dev/zero > "$out""#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn test_preset(max_output_bytes: u64) -> Preset {
        Preset {
            name: "test".to_string(),
            max_height: 720,
            frame_rate: 30,
            crf: 26,
            speed: "veryfast".to_string(),
            max_output_bytes,
        }
    }

    fn ctx_with(dir: &TempDir, ffmpeg: &Path, ytdlp: &Path) -> Arc<PipelineContext> {
        let config = WorkerConfig {
            input_dir: dir.path().join("in"),
            output_dir: dir.path().join("out"),
            ffmpeg_bin: ffmpeg.to_string_lossy().to_string(),
            ytdlp_bin: ytdlp.to_string_lossy().to_string(),
            transcode_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(30),
            retention_delay: Duration::from_secs(3600),
            ..WorkerConfig::default()
        };
        std::fs::create_dir_all(&config.input_dir).unwrap();
        std::fs::create_dir_all(&config.output_dir).unwrap();

        let registry = Arc::new(JobRegistry::new());
        let retention = Arc::new(RetentionScheduler::new(Arc::clone(&registry)));
        Arc::new(PipelineContext {
            config,
            registry,
            processes: Arc::new(ProcessTable::new()),
            retention,
        })
    }

    fn track(ctx: &PipelineContext, source: JobSource) -> JobId {
        let job = Job::new(JobId::new(), source, "test");
        let id = job.id.clone();
        ctx.registry.create(job);
        id
    }

    #[tokio::test]
    async fn test_upload_pipeline_compresses_and_cleans_input() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", COMPRESSING_FFMPEG);
        let ytdlp = write_script(dir.path(), "yt-dlp", "exit 1");
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let input = ctx.config.input_dir.join("upload.mp4");
        std::fs::write(&input, vec![0u8; 1000]).unwrap();
        let id = track(&ctx, JobSource::Upload { path: input.clone() });

        run_job(Arc::clone(&ctx), id.clone(), test_preset(10)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);

        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.original_bytes, 1000);
        assert_eq!(stats.compressed_bytes, 100);
        assert!(stats.reduction_percent > 0.0);

        assert!(!input.exists(), "upload input must be removed");
        assert!(snapshot.output_path.unwrap().exists());
        assert_eq!(ctx.retention.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_pipeline_failure_is_generic_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "echo 'Invalid data' >&2\nexit 1");
        let ytdlp = write_script(dir.path(), "yt-dlp", "exit 1");
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let input = ctx.config.input_dir.join("upload.mp4");
        std::fs::write(&input, vec![0u8; 1000]).unwrap();
        let id = track(&ctx, JobSource::Upload { path: input.clone() });

        run_job(Arc::clone(&ctx), id.clone(), test_preset(10)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Video processing failed"));
        assert_eq!(snapshot.progress, COMPRESS_START_PROGRESS);
        assert!(!input.exists(), "upload input must be removed on failure too");
        assert!(!ctx.output_path(&id).exists());
        assert_eq!(ctx.retention.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_under_ceiling_skips_transcoder() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ffmpeg-ran");
        let ffmpeg = write_script(
            dir.path(),
            "ffmpeg",
            &format!("touch {}\nexit 0", marker.display()),
        );
        let ytdlp = write_script(dir.path(), "yt-dlp", FETCHING_YTDLP);
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let id = track(
            &ctx,
            JobSource::Remote {
                url: "https://example.com/v".to_string(),
            },
        );

        run_job(Arc::clone(&ctx), id.clone(), test_preset(1024)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert!(!marker.exists(), "transcoder must not run under the ceiling");

        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.original_bytes, 500);
        assert_eq!(stats.compressed_bytes, 500);
        assert_eq!(stats.reduction_percent, 0.0);

        assert!(!ctx.fetch_path(&id).exists(), "fetch renamed to the output");
        assert!(snapshot.output_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_remote_over_ceiling_transcodes_and_removes_intermediate() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", COMPRESSING_FFMPEG);
        let ytdlp = write_script(dir.path(), "yt-dlp", FETCHING_YTDLP);
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let id = track(
            &ctx,
            JobSource::Remote {
                url: "https://example.com/v".to_string(),
            },
        );

        run_job(Arc::clone(&ctx), id.clone(), test_preset(10)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);

        let stats = snapshot.stats.unwrap();
        assert_eq!(stats.original_bytes, 500);
        assert_eq!(stats.compressed_bytes, 100);
        assert!(stats.reduction_percent > 0.0);

        assert!(!ctx.fetch_path(&id).exists(), "intermediate must be removed");
        assert!(snapshot.output_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_remote_transcode_failure_removes_intermediate() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "exit 1");
        let ytdlp = write_script(dir.path(), "yt-dlp", FETCHING_YTDLP);
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let id = track(
            &ctx,
            JobSource::Remote {
                url: "https://example.com/v".to_string(),
            },
        );

        run_job(Arc::clone(&ctx), id.clone(), test_preset(10)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(!ctx.fetch_path(&id).exists());
        assert!(!ctx.output_path(&id).exists());
    }

    #[tokio::test]
    async fn test_remote_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "exit 0");
        let ytdlp = write_script(dir.path(), "yt-dlp", "echo 'ERROR: no video' >&2\nexit 1");
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        let id = track(
            &ctx,
            JobSource::Remote {
                url: "https://example.com/v".to_string(),
            },
        );

        run_job(Arc::clone(&ctx), id.clone(), test_preset(10)).await;

        let snapshot = ctx.registry.get(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("Video download failed"));
        assert!(!ctx.fetch_path(&id).exists());
    }

    #[tokio::test]
    async fn test_run_job_with_unknown_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = write_script(dir.path(), "ffmpeg", "exit 0");
        let ytdlp = write_script(dir.path(), "yt-dlp", "exit 0");
        let ctx = ctx_with(&dir, &ffmpeg, &ytdlp);

        run_job(Arc::clone(&ctx), JobId::new(), test_preset(10)).await;
        assert!(ctx.registry.is_empty());
    }
}
