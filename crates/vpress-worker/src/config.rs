//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for staged uploads and fetched intermediates
    pub input_dir: PathBuf,
    /// Directory for completed artifacts
    pub output_dir: PathBuf,
    /// Maximum concurrently running pipelines
    pub max_concurrent_jobs: usize,
    /// Transcoder binary
    pub ffmpeg_bin: String,
    /// Downloader binary
    pub ytdlp_bin: String,
    /// Wall-clock limit for one downloader run
    pub download_timeout: Duration,
    /// Wall-clock limit for one transcoder run
    pub transcode_timeout: Duration,
    /// How long a completed artifact is kept before deletion
    pub retention_delay: Duration,
    /// Post-download grace window before the artifact is reclaimed
    pub grace_delay: Duration,
    /// How often the sweeper scans for forgotten terminal jobs
    pub sweep_interval: Duration,
    /// Terminal jobs older than this are evicted by the sweeper
    pub job_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/tmp/vpress/in"),
            output_dir: PathBuf::from("/tmp/vpress/out"),
            max_concurrent_jobs: 2,
            ffmpeg_bin: "ffmpeg".to_string(),
            ytdlp_bin: "yt-dlp".to_string(),
            download_timeout: Duration::from_secs(1800), // 30 minutes
            transcode_timeout: Duration::from_secs(3600), // 1 hour
            retention_delay: Duration::from_secs(30 * 60),
            grace_delay: Duration::from_secs(2 * 60),
            sweep_interval: Duration::from_secs(60),
            job_ttl: Duration::from_secs(2 * 3600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            input_dir: std::env::var("VPRESS_INPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.input_dir),
            output_dir: std::env::var("VPRESS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            max_concurrent_jobs: env_parse("VPRESS_MAX_JOBS", defaults.max_concurrent_jobs),
            ffmpeg_bin: std::env::var("VPRESS_FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ytdlp_bin: std::env::var("VPRESS_YTDLP_BIN").unwrap_or(defaults.ytdlp_bin),
            download_timeout: env_secs("VPRESS_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
            transcode_timeout: env_secs("VPRESS_TRANSCODE_TIMEOUT_SECS", defaults.transcode_timeout),
            retention_delay: env_secs("VPRESS_RETENTION_DELAY_SECS", defaults.retention_delay),
            grace_delay: env_secs("VPRESS_GRACE_DELAY_SECS", defaults.grace_delay),
            sweep_interval: env_secs("VPRESS_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            job_ttl: env_secs("VPRESS_JOB_TTL_SECS", defaults.job_ttl),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
