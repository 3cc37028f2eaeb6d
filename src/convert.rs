//! End-to-end conversions: decode a source, run the pipeline, and write the result.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    codec::{
        DecodedSource, FfmpegToolchain, FrameCodec, ImageCodec, VideoToolchain, ensure_parent_dir,
        write_atomically,
    },
    config::JobConfig,
    foundation::{
        core::{Canvas, Centis, Frame},
        error::{MonoframeError, MonoframeResult},
    },
    pipeline::{CancelFlag, PipelineOptions, PipelineStats, process_frame, process_sequence_with_stats},
    sequence::AnimatedSequence,
    stage::{Stage, StageTracker},
};

/// Highest frame rate a GIF can show; delays are whole centiseconds and most viewers clamp
/// anything faster than 2 cs.
pub const MAX_GIF_FPS: f64 = 50.0;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v"];

/// How a source file is handled, decided from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Still,
    Animated,
    Video,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext == "gif" {
            Self::Animated
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else {
            Self::Still
        }
    }
}

/// `<dir>/<stem>_<tag>[_x<scale>].<ext>`, with the scale part only when it is not 1.
pub fn output_path_for(input: &Path, tag: &str, scale: f64, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let mut name = format!("{stem}_{tag}");
    if scale != 1.0 {
        name.push_str(&format!("_x{scale:.2}"));
    }
    name.push('.');
    name.push_str(ext);
    input.with_file_name(name)
}

/// What happened to the audio track of a video conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioOutcome {
    /// Audio was not requested.
    Disabled,
    /// The re-encoded track was muxed in.
    Compressed,
    /// Re-encoding failed; the source audio (if any) was copied as-is.
    SourceCopy,
    /// Every audio step failed; the output is the silent video.
    Silent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub kind: SourceKind,
    pub frames: usize,
    pub canvas: Canvas,
    /// Whether the first decoded frame was dropped by the first-frame policy.
    pub dropped_first: bool,
    /// Frame rate of video outputs.
    pub fps: Option<u32>,
    pub audio: Option<AudioOutcome>,
    pub stats: PipelineStats,
}

/// Runs conversions for one job configuration against a pair of collaborators.
pub struct Converter<C = ImageCodec, V = FfmpegToolchain> {
    codec: C,
    video: V,
    config: JobConfig,
    cancel: Option<CancelFlag>,
}

impl Converter {
    pub fn new(config: JobConfig) -> Self {
        let video = FfmpegToolchain::new(config.timeouts);
        Self::with_collaborators(config, ImageCodec, video)
    }
}

impl<C: FrameCodec, V: VideoToolchain> Converter<C, V> {
    pub fn with_collaborators(config: JobConfig, codec: C, video: V) -> Self {
        Self {
            codec,
            video,
            config,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Default output path for `input` converted as `kind`.
    pub fn default_output(&self, input: &Path, kind: SourceKind) -> PathBuf {
        let tag = self.config.method.tag();
        let scale = self.config.scale;
        match kind {
            SourceKind::Still => output_path_for(input, &tag, scale, "png"),
            SourceKind::Animated => output_path_for(input, &format!("{tag}Anim"), scale, "gif"),
            SourceKind::Video => output_path_for(input, &format!("{tag}Anim"), scale, "mp4"),
        }
    }

    /// Converts `input` according to its detected kind.
    pub fn convert(&self, input: &Path, out: Option<&Path>) -> MonoframeResult<ConversionReport> {
        let kind = SourceKind::detect(input);
        let out = out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output(input, kind));
        match kind {
            SourceKind::Still => self.convert_still(input, &out),
            SourceKind::Animated => self.convert_animated(input, &out),
            SourceKind::Video => self.convert_video(input, &out),
        }
    }

    fn options(&self) -> PipelineOptions {
        let mut opts = self.config.pipeline_options();
        opts.cancel = self.cancel.clone();
        opts
    }

    fn check_cancelled(&self) -> MonoframeResult<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(MonoframeError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Decode, resize, quantize and write a single image.
    #[tracing::instrument(skip_all, fields(input = %input.display(), out = %out.display()))]
    pub fn convert_still(&self, input: &Path, out: &Path) -> MonoframeResult<ConversionReport> {
        self.config.validate()?;
        let mut tracker = StageTracker::new(input.display().to_string());

        let frame = tracker.run(Stage::Decoding, || {
            let decoded = self.codec.decode(input)?;
            decoded.frames.into_iter().next().ok_or_else(|| {
                MonoframeError::decode(format!("'{}' contains no image", input.display()))
            })
        })?;

        let binary = tracker.run(Stage::Quantizing, || {
            self.check_cancelled()?;
            process_frame(frame, self.config.method, self.config.scale)
        })?;
        let canvas = Canvas::new(binary.width(), binary.height());

        tracker.run(Stage::Encoding, || {
            self.check_cancelled()?;
            self.codec.encode_still(&binary.into_frame(), out)
        })?;
        tracker.finish()?;

        Ok(ConversionReport {
            output: out.to_path_buf(),
            kind: SourceKind::Still,
            frames: 1,
            canvas,
            dropped_first: false,
            fps: None,
            audio: None,
            stats: PipelineStats {
                frames_in: 1,
                frames_out: 1,
                parallel: false,
            },
        })
    }

    /// Decode an animated image, process every frame, and write a looping GIF.
    #[tracing::instrument(skip_all, fields(input = %input.display(), out = %out.display()))]
    pub fn convert_animated(&self, input: &Path, out: &Path) -> MonoframeResult<ConversionReport> {
        self.config.validate()?;
        let mut tracker = StageTracker::new(input.display().to_string());

        let (seq, dropped_first) = tracker.run(Stage::Decoding, || {
            let DecodedSource {
                frames,
                durations,
                canvas,
            } = self.codec.decode(input)?;
            // Decoders cannot report the source loop count, so it starts as "forever".
            let loop_count = self.config.loop_count.unwrap_or(0);
            let mut seq = AnimatedSequence::new(frames, durations, loop_count, canvas)?;
            let dropped = self.config.first_frame.apply(&mut seq);
            if seq.is_empty() {
                return Err(MonoframeError::decode(format!(
                    "'{}' contains no frames",
                    input.display()
                )));
            }
            Ok((seq, dropped))
        })?;

        let (processed, stats) =
            tracker.run(Stage::Quantizing, || process_sequence_with_stats(seq, &self.options()))?;

        tracker.run(Stage::Encoding, || {
            self.check_cancelled()?;
            self.codec.encode_animated(
                processed.frames(),
                processed.durations(),
                processed.loop_count,
                processed.canvas,
                out,
            )
        })?;
        tracker.finish()?;

        tracing::info!(
            frames = processed.len(),
            total_cs = processed.total_duration().0,
            dropped_first,
            "animated conversion done"
        );
        Ok(ConversionReport {
            output: out.to_path_buf(),
            kind: SourceKind::Animated,
            frames: processed.len(),
            canvas: processed.canvas,
            dropped_first,
            fps: None,
            audio: None,
            stats,
        })
    }

    /// Decode a video, process every frame, and write an MP4 with optional audio.
    ///
    /// The output keeps the source frame rate, so `time_scale` must be 1.
    #[tracing::instrument(skip_all, fields(input = %input.display(), out = %out.display()))]
    pub fn convert_video(&self, input: &Path, out: &Path) -> MonoframeResult<ConversionReport> {
        self.config.validate()?;
        if self.config.time_scale != 1.0 {
            return Err(MonoframeError::invalid_argument(format!(
                "time_scale {} cannot be applied to video output, which keeps the source frame rate",
                self.config.time_scale
            )));
        }
        let mut tracker = StageTracker::new(input.display().to_string());

        let (seq, rate) = tracker.run(Stage::Decoding, || {
            let rate = self.source_rate(input);
            Ok((self.decode_video(input, None, rate)?, rate))
        })?;
        let fps = (rate.round() as u32).max(1);
        let (processed, stats) = tracker.run(Stage::Quantizing, || {
            process_sequence_with_stats(seq, &self.frame_only_options())
        })?;

        let audio = tracker.run(Stage::Encoding, || {
            self.check_cancelled()?;
            self.encode_video(input, processed.frames(), fps, out)
        })?;
        tracker.finish()?;

        tracing::info!(frames = processed.len(), fps, ?audio, "video conversion done");
        Ok(ConversionReport {
            output: out.to_path_buf(),
            kind: SourceKind::Video,
            frames: processed.len(),
            canvas: processed.canvas,
            dropped_first: false,
            fps: Some(fps),
            audio: Some(audio),
            stats,
        })
    }

    /// Decode a video and write its dithered frames as a looping GIF.
    ///
    /// Frames are resampled to `gif_fps` (or the source rate) capped at [`MAX_GIF_FPS`], and
    /// delays follow the exact timeline of that rate divided by `time_scale`.
    #[tracing::instrument(skip_all, fields(input = %input.display(), out = %out.display()))]
    pub fn convert_video_to_gif(
        &self,
        input: &Path,
        out: &Path,
    ) -> MonoframeResult<ConversionReport> {
        self.config.validate()?;
        let mut tracker = StageTracker::new(input.display().to_string());

        let (seq, target) = tracker.run(Stage::Decoding, || {
            let source = self.source_rate(input);
            let target = self.config.gif_fps.unwrap_or(source).min(MAX_GIF_FPS);
            let resample = ((target - source).abs() > 1e-6).then_some(target);
            let seq = self.decode_video(input, resample, target / self.config.time_scale)?;
            Ok((seq, target))
        })?;
        // Durations already carry time_scale.
        let opts = PipelineOptions {
            time_scale: 1.0,
            ..self.frame_only_options()
        };
        let (processed, stats) =
            tracker.run(Stage::Quantizing, || process_sequence_with_stats(seq, &opts))?;

        tracker.run(Stage::Encoding, || {
            self.check_cancelled()?;
            self.codec.encode_animated(
                processed.frames(),
                processed.durations(),
                processed.loop_count,
                processed.canvas,
                out,
            )
        })?;
        tracker.finish()?;

        tracing::info!(
            frames = processed.len(),
            fps = target,
            total_cs = processed.total_duration().0,
            "video to gif conversion done"
        );
        Ok(ConversionReport {
            output: out.to_path_buf(),
            kind: SourceKind::Video,
            frames: processed.len(),
            canvas: processed.canvas,
            dropped_first: false,
            fps: Some((target.round() as u32).max(1)),
            audio: None,
            stats,
        })
    }

    /// Video frames come out of the toolchain already resized.
    fn frame_only_options(&self) -> PipelineOptions {
        PipelineOptions {
            scale: 1.0,
            ..self.options()
        }
    }

    fn source_rate(&self, input: &Path) -> f64 {
        match self
            .video
            .probe_frame_rate(input)
            .filter(|r| r.is_finite() && *r > 0.0)
        {
            Some(rate) => rate,
            None => {
                tracing::warn!(
                    fallback = self.config.fallback_fps,
                    "could not probe frame rate, using fallback"
                );
                f64::from(self.config.fallback_fps)
            }
        }
    }

    /// Extracts frames (resampled when `resample` is set) and times them at `timeline_fps`.
    fn decode_video(
        &self,
        input: &Path,
        resample: Option<f64>,
        timeline_fps: f64,
    ) -> MonoframeResult<AnimatedSequence> {
        let frames = self
            .video
            .extract_frames(input, resample, self.config.scale)?;
        let first = frames.first().ok_or_else(|| {
            MonoframeError::decode(format!("'{}' yielded no frames", input.display()))
        })?;
        let canvas = Canvas::new(first.width(), first.height());
        let durations = Centis::timeline(timeline_fps, frames.len());
        let loop_count = self.config.loop_count.unwrap_or(0);
        let seq = AnimatedSequence::new(frames, durations, loop_count, canvas)?;
        tracing::debug!(frames = seq.len(), timeline_fps, ?resample, "video decoded");
        Ok(seq)
    }

    fn encode_video(
        &self,
        input: &Path,
        frames: &[Frame],
        fps: u32,
        out: &Path,
    ) -> MonoframeResult<AudioOutcome> {
        let work = tempfile::Builder::new()
            .prefix("monoframe_video_")
            .tempdir()
            .map_err(|e| MonoframeError::resource(format!("failed to create temp dir: {e}")))?;
        let ext = out
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let silent = work.path().join(format!("silent.{ext}"));
        self.video.assemble_video(frames, fps, &silent)?;

        let (result, outcome) = self.attach_audio(input, &silent, work.path(), ext);
        move_into_place(&result, out)?;
        Ok(outcome)
    }

    /// Returns the file to publish and how audio was handled. Audio failures only downgrade the
    /// outcome.
    fn attach_audio(
        &self,
        input: &Path,
        silent: &Path,
        work: &Path,
        ext: &str,
    ) -> (PathBuf, AudioOutcome) {
        let audio = &self.config.audio;
        if !audio.include {
            return (silent.to_path_buf(), AudioOutcome::Disabled);
        }

        let muxed = work.join(format!("muxed.{ext}"));
        let compressed = work.join("audio.mka");
        if self
            .video
            .compress_audio(input, &compressed, audio.bitrate_kbps, &audio.codec)
        {
            match self.video.mux_audio(silent, &compressed, &muxed) {
                Ok(()) => return (muxed, AudioOutcome::Compressed),
                Err(e) => tracing::warn!(error = %e, "muxing compressed audio failed"),
            }
        }

        match self.video.copy_source_audio(silent, input, &muxed) {
            Ok(()) => (muxed, AudioOutcome::SourceCopy),
            Err(e) => {
                tracing::warn!(error = %e, "copying source audio failed, output is silent");
                (silent.to_path_buf(), AudioOutcome::Silent)
            }
        }
    }
}

/// Moves a finished temp artifact to `out`, copying when a rename is not possible (for example
/// across filesystems).
fn move_into_place(from: &Path, out: &Path) -> MonoframeResult<()> {
    ensure_parent_dir(out)?;
    if std::fs::rename(from, out).is_ok() {
        return Ok(());
    }
    let mut src = File::open(from).map_err(|e| {
        MonoframeError::resource(format!("failed to reopen '{}': {e}", from.display()))
    })?;
    write_atomically(out, |w| {
        std::io::copy(&mut src, w)
            .map(|_| ())
            .map_err(|e| MonoframeError::encode(format!("failed to copy into '{}': {e}", out.display())))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{dither::Method, pipeline::Threading, sequence::FirstFramePolicy};

    fn gradient(w: u32, h: u32, shift: u32) -> Frame {
        Frame::from_fn(w, h, |x, y| {
            let v = ((x * 255 / w.max(1) + y * 3 + shift) % 256) as u8;
            [v, v, v]
        })
    }

    /// Records every toolchain call; audio steps succeed or fail as configured.
    #[derive(Default)]
    struct FakeVideo {
        fps: Option<f64>,
        frames: usize,
        compress_ok: bool,
        mux_ok: bool,
        copy_ok: bool,
        assemble_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeVideo {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, s: impl Into<String>) {
            self.calls.lock().unwrap().push(s.into());
        }
    }

    impl VideoToolchain for FakeVideo {
        fn probe_frame_rate(&self, _source: &Path) -> Option<f64> {
            self.log("probe");
            self.fps
        }

        fn extract_frames(
            &self,
            _source: &Path,
            fps: Option<f64>,
            scale: f64,
        ) -> MonoframeResult<Vec<Frame>> {
            self.log(format!("extract fps={fps:?} scale={scale}"));
            let (w, h) = crate::transform::scaled_dimensions(8, 6, scale)?;
            Ok((0..self.frames).map(|i| gradient(w, h, i as u32 * 10)).collect())
        }

        fn assemble_video(&self, frames: &[Frame], fps: u32, out: &Path) -> MonoframeResult<()> {
            self.log(format!("assemble n={} fps={fps}", frames.len()));
            if self.assemble_fails {
                return Err(MonoframeError::encode("x264 exploded"));
            }
            assert!(frames.iter().all(Frame::is_binary));
            std::fs::write(out, b"silent").map_err(anyhow::Error::from)?;
            Ok(())
        }

        fn mux_audio(&self, _video: &Path, _audio: &Path, out: &Path) -> MonoframeResult<()> {
            self.log("mux");
            if !self.mux_ok {
                return Err(MonoframeError::encode("mux failed"));
            }
            std::fs::write(out, b"muxed").map_err(anyhow::Error::from)?;
            Ok(())
        }

        fn copy_source_audio(&self, _video: &Path, _source: &Path, out: &Path) -> MonoframeResult<()> {
            self.log("copy");
            if !self.copy_ok {
                return Err(MonoframeError::encode("copy failed"));
            }
            std::fs::write(out, b"copied").map_err(anyhow::Error::from)?;
            Ok(())
        }

        fn compress_audio(&self, _source: &Path, _out: &Path, kbps: u32, codec: &str) -> bool {
            self.log(format!("compress {codec} {kbps}k"));
            self.compress_ok
        }
    }

    fn converter(cfg: JobConfig, video: FakeVideo) -> Converter<ImageCodec, FakeVideo> {
        Converter::with_collaborators(cfg, ImageCodec, video)
    }

    #[test]
    fn source_kind_follows_extension() {
        assert_eq!(SourceKind::detect(Path::new("a/b.GIF")), SourceKind::Animated);
        assert_eq!(SourceKind::detect(Path::new("clip.mp4")), SourceKind::Video);
        assert_eq!(SourceKind::detect(Path::new("clip.webm")), SourceKind::Video);
        assert_eq!(SourceKind::detect(Path::new("photo.jpeg")), SourceKind::Still);
        assert_eq!(SourceKind::detect(Path::new("noext")), SourceKind::Still);
    }

    #[test]
    fn output_names_carry_tag_and_scale() {
        assert_eq!(
            output_path_for(Path::new("/in/cat.png"), "floydSteinberg", 1.0, "png"),
            PathBuf::from("/in/cat_floydSteinberg.png")
        );
        assert_eq!(
            output_path_for(Path::new("/in/cat.gif"), "randomAnim", 0.5, "gif"),
            PathBuf::from("/in/cat_randomAnim_x0.50.gif")
        );
        let conv = Converter::new(JobConfig {
            method: Method::Threshold { level: 90 },
            ..JobConfig::default()
        });
        assert_eq!(
            conv.default_output(Path::new("v.mov"), SourceKind::Video),
            PathBuf::from("v_threshold90Anim.mp4")
        );
    }

    #[test]
    fn still_conversion_writes_binary_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        ImageCodec.encode_still(&gradient(10, 6, 0), &input).unwrap();

        let conv = Converter::new(JobConfig {
            scale: 0.5,
            ..JobConfig::default()
        });
        let report = conv.convert(&input, None).unwrap();
        assert_eq!(report.output, dir.path().join("in_floydSteinberg_x0.50.png"));
        assert_eq!(report.canvas, Canvas::new(5, 3));

        let written = ImageCodec.decode(&report.output).unwrap();
        assert_eq!(written.frames[0].dimensions(), (5, 3));
        assert!(written.frames[0].is_binary());
    }

    #[test]
    fn animated_conversion_skips_first_frame_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.gif");
        let frames = vec![gradient(8, 8, 0), gradient(8, 8, 40), gradient(8, 8, 80)];
        let canvas = Canvas::new(8, 8);
        ImageCodec
            .encode_animated(&frames, &[Centis(4), Centis(7), Centis(9)], 0, canvas, &input)
            .unwrap();

        let conv = Converter::new(JobConfig {
            method: Method::OrderedBayer,
            ..JobConfig::default()
        });
        let out = dir.path().join("out.gif");
        let report = conv.convert(&input, Some(&out)).unwrap();
        assert!(report.dropped_first);
        assert_eq!(report.frames, 2);

        let written = ImageCodec.decode(&out).unwrap();
        assert_eq!(written.durations, vec![Centis(7), Centis(9)]);
        assert!(written.frames.iter().all(Frame::is_binary));
    }

    #[test]
    fn animated_conversion_can_keep_first_frame_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.gif");
        let frames = vec![gradient(6, 4, 0), gradient(6, 4, 100)];
        ImageCodec
            .encode_animated(&frames, &[Centis(5), Centis(5)], 0, Canvas::new(6, 4), &input)
            .unwrap();

        let conv = Converter::new(JobConfig {
            method: Method::Random { seed: 3 },
            first_frame: FirstFramePolicy::Keep,
            time_scale: 2.0,
            threading: Threading {
                parallel: true,
                threads: Some(2),
            },
            ..JobConfig::default()
        });
        let out = dir.path().join("out.gif");
        let report = conv.convert_animated(&input, &out).unwrap();
        assert!(!report.dropped_first);
        assert!(report.stats.parallel);
        let written = ImageCodec.decode(&out).unwrap();
        assert_eq!(written.durations, vec![Centis(10), Centis(10)]);
    }

    #[test]
    fn cancelled_run_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        ImageCodec.encode_still(&gradient(4, 4, 0), &input).unwrap();
        let out = dir.path().join("out.png");

        let flag = CancelFlag::new();
        flag.cancel();
        let conv = Converter::new(JobConfig::default()).with_cancel(flag);
        let err = conv.convert_still(&input, &out).unwrap_err();
        assert!(matches!(err, MonoframeError::Cancelled));
        assert!(!out.exists());
    }

    #[test]
    fn unreadable_source_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.gif");
        std::fs::write(&input, b"GIF89a but not really").unwrap();
        let err = Converter::new(JobConfig::default())
            .convert(&input, None)
            .unwrap_err();
        assert!(matches!(err, MonoframeError::Decode(_)), "{err}");
    }

    #[test]
    fn video_uses_fallback_fps_and_compressed_audio() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.mp4");
        let video = FakeVideo {
            fps: None,
            frames: 3,
            compress_ok: true,
            mux_ok: true,
            ..FakeVideo::default()
        };
        let conv = converter(
            JobConfig {
                scale: 0.5,
                ..JobConfig::default()
            },
            video,
        );
        let report = conv.convert_video(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.fps, Some(15));
        assert_eq!(report.audio, Some(AudioOutcome::Compressed));
        assert_eq!(report.canvas, Canvas::new(4, 3));
        assert_eq!(std::fs::read(&out).unwrap(), b"muxed");
        assert_eq!(
            conv.video.calls(),
            vec![
                "probe".to_string(),
                "extract fps=None scale=0.5".to_string(),
                "assemble n=3 fps=15".to_string(),
                "compress aac 16k".to_string(),
                "mux".to_string(),
            ]
        );
    }

    #[test]
    fn video_audio_falls_back_to_source_copy_then_silent() {
        let dir = tempfile::tempdir().unwrap();

        let out = dir.path().join("copy.mp4");
        let conv = converter(
            JobConfig::default(),
            FakeVideo {
                fps: Some(29.97),
                frames: 2,
                copy_ok: true,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.fps, Some(30));
        assert_eq!(report.audio, Some(AudioOutcome::SourceCopy));
        assert_eq!(std::fs::read(&out).unwrap(), b"copied");

        let out = dir.path().join("silent.mp4");
        let conv = converter(
            JobConfig::default(),
            FakeVideo {
                fps: Some(24.0),
                frames: 2,
                compress_ok: true,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.audio, Some(AudioOutcome::Silent));
        assert_eq!(std::fs::read(&out).unwrap(), b"silent");
        assert_eq!(
            conv.video.calls()[3..].to_vec(),
            vec!["compress aac 16k", "mux", "copy"]
        );
    }

    #[test]
    fn disabled_audio_skips_every_audio_step() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let mut cfg = JobConfig::default();
        cfg.audio.include = false;
        let conv = converter(
            cfg,
            FakeVideo {
                fps: Some(10.0),
                frames: 1,
                compress_ok: true,
                mux_ok: true,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.audio, Some(AudioOutcome::Disabled));
        assert_eq!(conv.video.calls().len(), 3);
        assert_eq!(std::fs::read(&out).unwrap(), b"silent");
    }

    #[test]
    fn failed_assembly_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let conv = converter(
            JobConfig::default(),
            FakeVideo {
                fps: Some(25.0),
                frames: 2,
                assemble_fails: true,
                ..FakeVideo::default()
            },
        );
        let err = conv.convert_video(Path::new("clip.mp4"), &out).unwrap_err();
        assert!(matches!(err, MonoframeError::Encode(_)));
        assert!(!out.exists());
    }

    #[test]
    fn video_to_gif_caps_rate_and_sets_durations() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.gif");
        let conv = converter(
            JobConfig {
                method: Method::Threshold { level: 128 },
                ..JobConfig::default()
            },
            FakeVideo {
                fps: Some(60.0),
                frames: 3,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video_to_gif(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.fps, Some(50));
        assert_eq!(conv.video.calls()[1], "extract fps=Some(50.0) scale=1");

        let written = ImageCodec.decode(&out).unwrap();
        assert_eq!(written.durations, vec![Centis(2); 3]);
        assert_eq!(written.canvas, Canvas::new(8, 6));
    }

    #[test]
    fn video_to_gif_keeps_real_time_at_thirty_fps() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.gif");
        let conv = converter(
            JobConfig {
                method: Method::OrderedBayer,
                ..JobConfig::default()
            },
            FakeVideo {
                fps: Some(30.0),
                frames: 30,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video_to_gif(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.fps, Some(30));
        assert_eq!(conv.video.calls()[1], "extract fps=None scale=1");

        let written = ImageCodec.decode(&out).unwrap();
        assert_eq!(written.durations.len(), 30);
        assert_eq!(&written.durations[..3], &[Centis(3), Centis(4), Centis(3)]);
        assert_eq!(written.durations.iter().map(|d| d.0).sum::<u32>(), 100);
    }

    #[test]
    fn video_to_gif_honours_requested_rate_and_time_scale() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.gif");
        let conv = converter(
            JobConfig {
                gif_fps: Some(10.0),
                time_scale: 2.0,
                ..JobConfig::default()
            },
            FakeVideo {
                fps: Some(30.0),
                frames: 4,
                ..FakeVideo::default()
            },
        );
        let report = conv.convert_video_to_gif(Path::new("clip.mp4"), &out).unwrap();
        assert_eq!(report.fps, Some(10));
        assert_eq!(conv.video.calls()[1], "extract fps=Some(10.0) scale=1");

        let written = ImageCodec.decode(&out).unwrap();
        assert_eq!(written.durations, vec![Centis(20); 4]);
    }

    #[test]
    fn video_output_rejects_time_scale() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let conv = converter(
            JobConfig {
                time_scale: 0.5,
                ..JobConfig::default()
            },
            FakeVideo {
                fps: Some(25.0),
                frames: 2,
                ..FakeVideo::default()
            },
        );
        let err = conv.convert_video(Path::new("clip.mp4"), &out).unwrap_err();
        assert!(matches!(err, MonoframeError::InvalidArgument(_)), "{err}");
        assert!(err.to_string().contains("time_scale"));
        assert!(conv.video.calls().is_empty());
        assert!(!out.exists());
    }
}
