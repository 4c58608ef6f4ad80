//! Compression result statistics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Size accounting for a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompressionStats {
    /// Input size in bytes
    pub original_bytes: u64,
    /// Output artifact size in bytes
    pub compressed_bytes: u64,
    /// Size reduction percentage (0 when the output is not smaller)
    pub reduction_percent: f32,
}

impl CompressionStats {
    /// Compute stats from before/after sizes.
    pub fn from_sizes(original_bytes: u64, compressed_bytes: u64) -> Self {
        let reduction_percent = if original_bytes > 0 && compressed_bytes < original_bytes {
            (original_bytes - compressed_bytes) as f32 / original_bytes as f32 * 100.0
        } else {
            0.0
        };
        Self {
            original_bytes,
            compressed_bytes,
            reduction_percent,
        }
    }

    /// Pass-through stats for artifacts served without transcoding.
    pub fn pass_through(bytes: u64) -> Self {
        Self {
            original_bytes: bytes,
            compressed_bytes: bytes,
            reduction_percent: 0.0,
        }
    }
}
