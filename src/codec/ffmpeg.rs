use std::{
    io::{Read, Write as _},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{SyncSender, TrySendError},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use super::VideoToolchain;
use crate::foundation::{
    core::Frame,
    error::{MonoframeError, MonoframeResult},
};

/// Upper bounds for external tool invocations. A tool still running at its deadline is killed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    pub probe_secs: u64,
    pub extract_secs: u64,
    pub assemble_secs: u64,
    pub audio_secs: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe_secs: 30,
            extract_secs: 600,
            assemble_secs: 600,
            audio_secs: 600,
        }
    }
}

const TOOL_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

pub fn is_ffmpeg_on_path() -> bool {
    tool_responds(Path::new("ffmpeg"), TOOL_CHECK_TIMEOUT)
}

pub fn is_ffprobe_on_path() -> bool {
    tool_responds(Path::new("ffprobe"), TOOL_CHECK_TIMEOUT)
}

/// True when `tool -version` exits successfully within `timeout`.
fn tool_responds(tool: &Path, timeout: Duration) -> bool {
    let mut cmd = Command::new(tool);
    cmd.arg("-version");
    run_tool(cmd, timeout, MonoframeError::resource).is_ok_and(|out| out.status.success())
}

/// Video collaborator backed by the system `ffmpeg` and `ffprobe` binaries.
///
/// We call the binaries rather than linking libav so no native dev headers are needed.
#[derive(Clone, Debug)]
pub struct FfmpegToolchain {
    pub timeouts: ToolTimeouts,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self::new(ToolTimeouts::default())
    }
}

impl FfmpegToolchain {
    /// Uses `ffmpeg` and `ffprobe` from `PATH`.
    pub fn new(timeouts: ToolTimeouts) -> Self {
        Self {
            timeouts,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_binaries(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// Whether both binaries answer `-version`.
    pub fn is_available(&self) -> bool {
        tool_responds(&self.ffmpeg, TOOL_CHECK_TIMEOUT) && tool_responds(&self.ffprobe, TOOL_CHECK_TIMEOUT)
    }
}

impl VideoToolchain for FfmpegToolchain {
    fn probe_frame_rate(&self, source: &Path) -> Option<f64> {
        #[derive(serde::Deserialize)]
        struct ProbeStream {
            r_frame_rate: Option<String>,
            avg_frame_rate: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct ProbeOut {
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate,avg_frame_rate",
            "-print_format",
            "json",
        ])
        .arg(source);

        let out = match run_tool(cmd, secs(self.timeouts.probe_secs), MonoframeError::decode) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "ffprobe failed");
                return None;
            }
        };
        let parsed: ProbeOut = serde_json::from_slice(&out.stdout).ok()?;
        let stream = parsed.streams.first()?;
        [stream.r_frame_rate.as_deref(), stream.avg_frame_rate.as_deref()]
            .into_iter()
            .flatten()
            .find_map(parse_ff_rate)
    }

    #[tracing::instrument(skip(self, source), fields(source = %source.display()))]
    fn extract_frames(
        &self,
        source: &Path,
        fps: Option<f64>,
        scale: f64,
    ) -> MonoframeResult<Vec<Frame>> {
        crate::transform::validate_scale(scale)?;
        let dir = tempfile::Builder::new()
            .prefix("monoframe_frames_")
            .tempdir()
            .map_err(|e| MonoframeError::resource(format!("failed to create temp dir: {e}")))?;

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-i"]).arg(source);
        if let Some(filter) = extract_filter(fps, scale) {
            cmd.args(["-vf", &filter]);
        }
        cmd.arg(dir.path().join("frame%06d.png"));
        run_checked(cmd, secs(self.timeouts.extract_secs), MonoframeError::decode, "frame extraction")?;

        let mut paths = std::fs::read_dir(dir.path())
            .map_err(|e| MonoframeError::resource(format!("failed to list extracted frames: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_extracted_frame(p))
            .collect::<Vec<_>>();
        paths.sort();
        if paths.is_empty() {
            return Err(MonoframeError::decode(format!(
                "ffmpeg extracted no frames from '{}'",
                source.display()
            )));
        }

        let mut frames = Vec::with_capacity(paths.len());
        for p in &paths {
            let img = image::open(p).map_err(|e| {
                MonoframeError::decode(format!("failed to read extracted frame '{}': {e}", p.display()))
            })?;
            frames.push(Frame::from_dynamic(img));
        }
        tracing::debug!(frames = frames.len(), "extracted frames");
        Ok(frames)
    }

    #[tracing::instrument(skip_all, fields(frames = frames.len(), fps = fps, out = %out.display()))]
    fn assemble_video(&self, frames: &[Frame], fps: u32, out: &Path) -> MonoframeResult<()> {
        let first = frames
            .first()
            .ok_or_else(|| MonoframeError::invalid_argument("no frames to assemble"))?;
        let cfg = EncodeConfig {
            width: first.width(),
            height: first.height(),
            fps,
            out_path: out.to_path_buf(),
        };
        let mut enc = RawVideoEncoder::new(&self.ffmpeg, cfg, secs(self.timeouts.assemble_secs))?;
        for frame in frames {
            enc.encode_frame(frame)?;
        }
        enc.finish()
    }

    fn mux_audio(&self, video: &Path, audio: &Path, out: &Path) -> MonoframeResult<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-i"])
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-map", "0:v", "-map", "1:a", "-c", "copy"])
            .arg(out);
        run_checked(cmd, secs(self.timeouts.audio_secs), MonoframeError::encode, "audio mux")
    }

    fn copy_source_audio(&self, video: &Path, source: &Path, out: &Path) -> MonoframeResult<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-i"])
            .arg(video)
            .arg("-i")
            .arg(source)
            .args(["-map", "0:v", "-map", "1:a?", "-c", "copy"])
            .arg(out);
        run_checked(cmd, secs(self.timeouts.audio_secs), MonoframeError::encode, "source audio copy")
    }

    fn compress_audio(&self, source: &Path, out: &Path, bitrate_kbps: u32, codec: &str) -> bool {
        // Mono at 22.05 kHz keeps the track small.
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-i"])
            .arg(source)
            .args([
                "-vn",
                "-c:a",
                codec,
                "-b:a",
                &format!("{bitrate_kbps}k"),
                "-ac",
                "1",
                "-ar",
                "22050",
            ])
            .arg(out);
        match run_checked(cmd, secs(self.timeouts.audio_secs), MonoframeError::encode, "audio compression") {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(source = %source.display(), codec, bitrate_kbps, error = %e, "audio compression failed");
                false
            }
        }
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn extract_filter(fps: Option<f64>, scale: f64) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(fps) = fps.filter(|f| f.is_finite() && *f > 0.0) {
        parts.push(format!("fps={fps}"));
    }
    if scale != 1.0 {
        parts.push(format!(
            "scale=w='max(1,round(iw*{scale}))':h='max(1,round(ih*{scale}))':flags=lanczos"
        ));
    }
    (!parts.is_empty()).then(|| parts.join(","))
}

fn is_extracted_frame(p: &Path) -> bool {
    p.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("frame"))
        .and_then(|n| n.strip_suffix(".png"))
        .is_some_and(|digits| digits.len() == 6 && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Parses ffprobe rates such as `30000/1001` or `25`. Zero rates count as unknown.
fn parse_ff_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((a, b)) => {
            let a = a.trim().parse::<f64>().ok()?;
            let b = b.trim().parse::<f64>().ok()?;
            if b == 0.0 {
                return None;
            }
            a / b
        }
        None => s.trim().parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

struct ToolOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn spawn_reader<R: Read + Send + 'static>(src: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = src {
            let _ = r.read_to_end(&mut buf);
        }
        buf
    })
}

/// Waits for `child`, killing it once `timeout` has passed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn run_tool(
    mut cmd: Command,
    timeout: Duration,
    err: fn(String) -> MonoframeError,
) -> MonoframeResult<ToolOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    tracing::debug!(?cmd, "running external tool");
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| err(format!("failed to spawn {program} (is it installed and on PATH?): {e}")))?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());
    let status = wait_with_deadline(&mut child, timeout)
        .map_err(|e| err(format!("failed to wait for {program}: {e}")))?;
    // A killed tool may leave children holding the pipes, so readers are only joined after a
    // normal exit.
    let Some(status) = status else {
        return Err(err(format!(
            "{program} timed out after {}s",
            timeout.as_secs_f64()
        )));
    };
    Ok(ToolOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn run_checked(
    cmd: Command,
    timeout: Duration,
    err: fn(String) -> MonoframeError,
    what: &str,
) -> MonoframeResult<()> {
    let out = run_tool(cmd, timeout, err)?;
    if !out.status.success() {
        return Err(err(format!(
            "{what} failed with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

#[derive(Clone, Debug)]
struct EncodeConfig {
    width: u32,
    height: u32,
    fps: u32,
    out_path: PathBuf,
}

impl EncodeConfig {
    fn validate(&self) -> MonoframeResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MonoframeError::invalid_argument(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(MonoframeError::invalid_argument("encode fps must be non-zero"));
        }
        Ok(())
    }
}

/// Streams raw `rgb24` frames into an `ffmpeg` child that writes H.264/yuv420p.
///
/// yuv420p needs even dimensions, so odd frames are padded by one pixel on the right/bottom.
/// Frames go through a one-slot queue to a writer thread that owns the child's stdin, so a
/// child that stops reading is noticed and killed at the deadline instead of blocking forever.
struct RawVideoEncoder {
    cfg: EncodeConfig,
    child: Child,
    frames: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    timeout: Duration,
    deadline: Instant,
}

impl RawVideoEncoder {
    fn new(program: &Path, cfg: EncodeConfig, timeout: Duration) -> MonoframeResult<Self> {
        cfg.validate()?;
        super::ensure_parent_dir(&cfg.out_path)?;

        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            MonoframeError::encode(format!(
                "failed to spawn {} (is it installed and on PATH?): {e}",
                program.display()
            ))
        })?;
        let deadline = Instant::now() + timeout;

        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MonoframeError::encode("failed to open ffmpeg stdin (unexpected)"));
        };
        let stderr = spawn_reader(child.stderr.take());

        let (frames, queue) = std::sync::mpsc::sync_channel::<Vec<u8>>(1);
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            for buf in queue {
                stdin.write_all(&buf)?;
            }
            Ok(())
        });

        Ok(Self {
            cfg,
            child,
            frames: Some(frames),
            writer: Some(writer),
            stderr: Some(stderr),
            timeout,
            deadline,
        })
    }

    fn encode_frame(&mut self, frame: &Frame) -> MonoframeResult<()> {
        if frame.dimensions() != (self.cfg.width, self.cfg.height) {
            return Err(MonoframeError::invalid_argument(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.cfg.width,
                self.cfg.height
            )));
        }

        let Some(frames) = self.frames.clone() else {
            return Err(MonoframeError::encode("ffmpeg encoder is already finalized"));
        };

        let mut pending = frame.data().to_vec();
        loop {
            pending = match frames.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => back,
                Err(TrySendError::Disconnected(_)) => {
                    // The writer hit a broken pipe; ffmpeg's stderr usually says why.
                    drop(frames);
                    let detail = self.abort();
                    return Err(MonoframeError::encode(format!(
                        "ffmpeg stopped accepting frames{detail}"
                    )));
                }
            };
            if let Ok(Some(status)) = self.child.try_wait() {
                drop(frames);
                let detail = self.abort();
                return Err(MonoframeError::encode(format!(
                    "ffmpeg exited with status {status} before all frames were written{detail}"
                )));
            }
            if Instant::now() >= self.deadline {
                drop(frames);
                self.kill();
                return Err(self.timed_out());
            }
            std::thread::sleep(POLL);
        }
    }

    /// Kills the child without waiting on its pipes; a stuck writer or reader thread is left to
    /// finish on its own once the pipes close.
    fn kill(&mut self) {
        drop(self.frames.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        drop(self.writer.take());
        drop(self.stderr.take());
    }

    /// Stops an encoder whose child already failed and returns its stderr for the error message.
    fn abort(&mut self) -> String {
        drop(self.frames.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        drop(self.writer.take());
        self.collect_stderr()
            .map(|s| format!(" ({s})"))
            .unwrap_or_default()
    }

    fn collect_stderr(&mut self) -> Option<String> {
        let bytes = self.stderr.take()?.join().ok()?;
        let s = String::from_utf8_lossy(&bytes).trim().to_string();
        (!s.is_empty()).then_some(s)
    }

    fn timed_out(&self) -> MonoframeError {
        MonoframeError::encode(format!(
            "ffmpeg timed out after {}s",
            self.timeout.as_secs_f64()
        ))
    }

    fn finish(mut self) -> MonoframeResult<()> {
        // Closing the queue lets the writer drain and close stdin, which ends the stream.
        drop(self.frames.take());

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let status = wait_with_deadline(&mut self.child, remaining)
            .map_err(|e| MonoframeError::encode(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let Some(status) = status else {
            self.kill();
            return Err(self.timed_out());
        };

        let written = self.writer.take().map(JoinHandle::join);
        let stderr = self.collect_stderr().unwrap_or_default();
        if !status.success() {
            return Err(MonoframeError::encode(format!(
                "ffmpeg exited with status {status}: {stderr}"
            )));
        }
        match written {
            Some(Ok(Err(e))) => Err(MonoframeError::encode(format!(
                "failed to write frames to ffmpeg stdin: {e}"
            ))),
            Some(Err(_)) => Err(MonoframeError::encode("ffmpeg frame writer panicked")),
            _ => Ok(()),
        }
    }
}
