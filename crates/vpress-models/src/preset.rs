//! Transcode presets and the preset catalog.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the preset used when a request names none, or an unknown one.
pub const DEFAULT_PRESET: &str = "balanced";

/// Default audio codec for transcoded outputs
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate for transcoded outputs
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default video codec for transcoded outputs
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";

const MB: u64 = 1024 * 1024;

/// Named bundle of transcode parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Preset {
    /// Preset name
    pub name: String,
    /// Output height ceiling in pixels (width follows the aspect ratio)
    pub max_height: u32,
    /// Target frame rate
    pub frame_rate: u32,
    /// Constant Rate Factor (quality, lower is better)
    pub crf: u8,
    /// Encoder speed profile (e.g. "medium", "slow")
    pub speed: String,
    /// Artifacts already at or under this size skip transcoding
    pub max_output_bytes: u64,
}

impl Preset {
    fn new(
        name: &str,
        max_height: u32,
        frame_rate: u32,
        crf: u8,
        speed: &str,
        max_output_mb: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            max_height,
            frame_rate,
            crf,
            speed: speed.to_string(),
            max_output_bytes: max_output_mb * MB,
        }
    }

    /// Codec/quality FFmpeg output arguments implementing this preset.
    ///
    /// Scaling and frame rate are applied separately via the command
    /// builder's filter setters.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            DEFAULT_VIDEO_CODEC.to_string(),
            "-preset".to_string(),
            self.speed.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            DEFAULT_AUDIO_CODEC.to_string(),
            "-b:a".to_string(),
            DEFAULT_AUDIO_BITRATE.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]
    }

    /// Scale filter enforcing the resolution ceiling.
    ///
    /// Only ever downscales (`min(ceiling, ih)`); the `-2` width keeps the
    /// encoder-required even dimension.
    pub fn scale_filter(&self) -> String {
        format!("scale=-2:min({}\\,ih)", self.max_height)
    }
}

/// Static mapping from preset name to transcode parameters.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetCatalog {
    /// The built-in catalog, loaded once at process start.
    pub fn builtin() -> Self {
        Self {
            presets: vec![
                Preset::new(DEFAULT_PRESET, 1080, 30, 23, "medium", 1400),
                Preset::new("efficient", 720, 30, 26, "slow", 800),
                Preset::new("compact", 480, 24, 28, "veryfast", 300),
            ],
        }
    }

    /// Resolve a preset by name.
    ///
    /// Unknown or missing names fall back to the default preset; resolution
    /// never fails.
    pub fn resolve(&self, name: Option<&str>) -> &Preset {
        let wanted = name.unwrap_or(DEFAULT_PRESET);
        if let Some(preset) = self.presets.iter().find(|p| p.name == wanted) {
            return preset;
        }
        self.default_preset()
    }

    /// The designated default preset.
    pub fn default_preset(&self) -> &Preset {
        self.presets
            .iter()
            .find(|p| p.name == DEFAULT_PRESET)
            .unwrap_or(&self.presets[0])
    }

    /// Names of all known presets.
    pub fn names(&self) -> Vec<&str> {
        self.presets.iter().map(|p| p.name.as_str()).collect()
    }
}
