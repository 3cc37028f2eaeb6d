//! Contracts the pipeline needs from codec implementations, plus the two implementations:
//! [`ImageCodec`] (still images and GIF through the `image` crate) and [`FfmpegToolchain`]
//! (video through the system `ffmpeg`/`ffprobe` binaries).

mod ffmpeg;
mod image_codec;

use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::Path,
};

use anyhow::Context as _;

pub use ffmpeg::{FfmpegToolchain, ToolTimeouts, is_ffmpeg_on_path, is_ffprobe_on_path};
pub use image_codec::ImageCodec;

use crate::foundation::{
    core::{Canvas, Centis, Frame},
    error::{MonoframeError, MonoframeResult},
};

/// Frames decoded from a source, in display order.
#[derive(Clone, Debug)]
pub struct DecodedSource {
    pub frames: Vec<Frame>,
    pub durations: Vec<Centis>,
    pub canvas: Canvas,
}

/// Decodes sources into frames and encodes processed frames back into files.
pub trait FrameCodec {
    /// Fails with `Decode` when the source is unreadable or in an unknown format.
    fn decode(&self, source: &Path) -> MonoframeResult<DecodedSource>;

    /// Writes a looping animation. Frame order and per-frame durations are kept exactly.
    fn encode_animated(
        &self,
        frames: &[Frame],
        durations: &[Centis],
        loop_count: u16,
        canvas: Canvas,
        out: &Path,
    ) -> MonoframeResult<()>;

    fn encode_still(&self, frame: &Frame, out: &Path) -> MonoframeResult<()>;
}

/// Video helpers backed by an external tool.
///
/// Audio operations are best-effort: callers fall back to a silent result when they fail.
pub trait VideoToolchain {
    /// Source frame rate, or `None` when it cannot be determined.
    fn probe_frame_rate(&self, source: &Path) -> Option<f64>;

    /// Decodes the video into frames, optionally resampled to `fps` and resized by `scale`.
    fn extract_frames(&self, source: &Path, fps: Option<f64>, scale: f64)
    -> MonoframeResult<Vec<Frame>>;

    /// Encodes `frames` into a silent video at `fps`.
    fn assemble_video(&self, frames: &[Frame], fps: u32, out: &Path) -> MonoframeResult<()>;

    /// Combines the video stream of `video` with the audio file `audio`.
    fn mux_audio(&self, video: &Path, audio: &Path, out: &Path) -> MonoframeResult<()>;

    /// Combines the video stream of `video` with whatever audio `source` carries, unchanged.
    fn copy_source_audio(&self, video: &Path, source: &Path, out: &Path) -> MonoframeResult<()>;

    /// Re-encodes the audio track of `source` into `out`; returns whether it worked.
    fn compress_audio(&self, source: &Path, out: &Path, bitrate_kbps: u32, codec: &str) -> bool;
}

pub fn ensure_parent_dir(path: &Path) -> MonoframeResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Writes `out` through a temp file in the same directory that is renamed into place only
/// when `write` succeeds. A failed or abandoned write leaves no partial file behind.
pub(crate) fn write_atomically(
    out: &Path,
    write: impl FnOnce(&mut BufWriter<&mut File>) -> MonoframeResult<()>,
) -> MonoframeResult<()> {
    ensure_parent_dir(out)?;
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".monoframe-")
        .tempfile_in(dir)
        .map_err(|e| {
            MonoframeError::resource(format!(
                "failed to create temp file in '{}': {e}",
                dir.display()
            ))
        })?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        write(&mut w)?;
        w.flush()
            .map_err(|e| MonoframeError::encode(format!("failed to flush '{}': {e}", out.display())))?;
    }
    tmp.persist(out).map_err(|e| {
        MonoframeError::encode(format!("failed to move output into '{}': {}", out.display(), e.error))
    })?;
    Ok(())
}
