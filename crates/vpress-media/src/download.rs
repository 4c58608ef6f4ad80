//! Remote video fetching via yt-dlp.

use std::path::Path;

use tracing::{debug, info};

use vpress_models::JobId;

use crate::error::{MediaError, MediaResult};
use crate::runner::ToolRunner;

/// Build the yt-dlp argument vector for one fetch.
///
/// `max_height` filters formats down to the preset's resolution ceiling so
/// the fetch never pulls more pixels than the transcode target. The URL goes
/// in as a discrete trailing argument.
pub fn build_download_args(url: &str, output_path: &Path, max_height: u32) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "-f".to_string(),
        format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best[height<={h}]/best",
            h = max_height
        ),
        "-o".to_string(),
        output_path.to_string_lossy().to_string(),
        url.to_string(),
    ]
}

/// Fetch a remote video with yt-dlp.
///
/// Runs through the shared [`ToolRunner`] so fetches get the same timeout,
/// cancellation, and process-table semantics as transcodes. `ytdlp` is the
/// downloader binary (normally "yt-dlp", overridable for deployment images).
pub async fn fetch_remote(
    runner: &ToolRunner,
    job_id: &JobId,
    ytdlp: &str,
    url: &str,
    output_path: &Path,
    max_height: u32,
) -> MediaResult<()> {
    let args = build_download_args(url, output_path, max_height);

    info!(
        job_id = %job_id,
        url = %url,
        output = %output_path.display(),
        "Fetching remote video"
    );

    let result = runner.run(job_id, ytdlp, &args, |_| {}).await;

    if let Err(e) = result {
        return Err(match e {
            MediaError::ToolFailed { detail, .. } => {
                debug!(job_id = %job_id, "yt-dlp output: {}", detail);
                MediaError::download_failed(last_line(&detail))
            }
            // keep timeout/cancellation classification intact
            other => other,
        });
    }

    if !output_path.exists() {
        return Err(MediaError::download_failed("output file not created"));
    }

    Ok(())
}

fn last_line(s: &str) -> String {
    s.lines().last().unwrap_or("unknown error").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_download_args_shape() {
        let out = PathBuf::from("/tmp/fetch.mp4");
        let args = build_download_args("https://example.com/watch?v=abc", &out, 720);

        // format filter carries the resolution ceiling
        let f_pos = args.iter().position(|a| a == "-f").expect("-f present");
        assert!(args[f_pos + 1].contains("height<=720"));

        // output path follows -o, URL is the final discrete argument
        let o_pos = args.iter().position(|a| a == "-o").expect("-o present");
        assert_eq!(args[o_pos + 1], "/tmp/fetch.mp4");
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://example.com/watch?v=abc")
        );
        assert!(args.contains(&"--no-playlist".to_string()));
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\nb\nERROR: boom"), "ERROR: boom");
        assert_eq!(last_line(""), "unknown error");
    }
}
