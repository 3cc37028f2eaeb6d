use std::path::Path;

use anyhow::Context as _;

use crate::{
    codec::ToolTimeouts,
    dither::Method,
    foundation::error::{MonoframeError, MonoframeResult},
    pipeline::{PipelineOptions, Threading},
    sequence::FirstFramePolicy,
};

/// Frame rate used when a video's rate cannot be probed.
pub const DEFAULT_FALLBACK_FPS: u32 = 15;

/// Audio handling for video conversions.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub include: bool,
    pub codec: String,
    pub bitrate_kbps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            include: true,
            codec: "aac".to_string(),
            bitrate_kbps: 16,
        }
    }
}

/// One conversion job, as read from a JSON file or assembled from CLI flags.
///
/// ```json
/// { "method": { "kind": "threshold", "level": 100 }, "scale": 0.5, "threading": { "parallel": true } }
/// ```
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub method: Method,
    pub scale: f64,
    pub time_scale: f64,
    pub first_frame: FirstFramePolicy,
    /// Replaces the source loop count when set (0 = loop forever).
    pub loop_count: Option<u16>,
    pub threading: Threading,
    pub audio: AudioConfig,
    pub fallback_fps: u32,
    /// Frame rate of GIFs made from video (defaults to the source rate, at most 50).
    pub gif_fps: Option<f64>,
    pub timeouts: ToolTimeouts,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            scale: 1.0,
            time_scale: 1.0,
            first_frame: FirstFramePolicy::default(),
            loop_count: None,
            threading: Threading::default(),
            audio: AudioConfig::default(),
            fallback_fps: DEFAULT_FALLBACK_FPS,
            gif_fps: None,
            timeouts: ToolTimeouts::default(),
        }
    }
}

impl JobConfig {
    pub fn from_path(path: &Path) -> MonoframeResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> MonoframeResult<()> {
        self.pipeline_options().validate()?;
        if self.audio.bitrate_kbps == 0 {
            return Err(MonoframeError::invalid_argument(
                "audio bitrate_kbps must be > 0",
            ));
        }
        if self.audio.codec.trim().is_empty() {
            return Err(MonoframeError::invalid_argument("audio codec must not be empty"));
        }
        if self.fallback_fps == 0 {
            return Err(MonoframeError::invalid_argument("fallback_fps must be >= 1"));
        }
        if let Some(fps) = self.gif_fps
            && (!fps.is_finite() || fps <= 0.0)
        {
            return Err(MonoframeError::invalid_argument(format!(
                "gif_fps must be a finite number > 0 (got {fps})"
            )));
        }
        let t = &self.timeouts;
        if [t.probe_secs, t.extract_secs, t.assemble_secs, t.audio_secs].contains(&0) {
            return Err(MonoframeError::invalid_argument("tool timeouts must be >= 1s"));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            method: self.method,
            scale: self.scale,
            time_scale: self.time_scale,
            threading: self.threading.clone(),
            cancel: None,
        }
    }
}
