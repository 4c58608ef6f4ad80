//! External tool plumbing for the vpress job server.
//!
//! Wraps ffmpeg and yt-dlp as opaque subprocesses: discrete-argv launching
//! with timeout and cancellation, incremental progress parsing from the
//! transcoder's diagnostic stream, and the filesystem helpers the retention
//! engine relies on.

pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod progress;
pub mod runner;

pub use command::FfmpegCommand;
pub use download::{build_download_args, fetch_remote};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_file_if_exists};
pub use progress::ProgressParser;
pub use runner::{check_tool, probe_tool, ProcessTable, ToolRunner};
