//! Shared data models for the vpress job server.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle status
//! - Transcode presets and the preset catalog
//! - Compression result statistics

pub mod job;
pub mod preset;
pub mod stats;

// Re-export common types
pub use job::{Job, JobId, JobSource, JobStatus};
pub use preset::{Preset, PresetCatalog, DEFAULT_PRESET};
pub use stats::CompressionStats;
