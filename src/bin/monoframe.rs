use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use monoframe::{
    Converter, FfmpegToolchain, FirstFramePolicy, JobConfig, Method, SourceKind,
    dither::{DEFAULT_JITTER_SEED, DEFAULT_RANDOM_SEED, DEFAULT_THRESHOLD},
    output_path_for,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "monoframe", version, about = "1-bit dithering for images, GIFs and videos")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dither a still image into a PNG.
    Image(ImageArgs),
    /// Dither every frame of an animated GIF.
    Gif(GifArgs),
    /// Dither every frame of a video (requires `ffmpeg` and `ffprobe` on PATH).
    Video(VideoArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Input file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output path (defaults to `<input stem>_<method>[_x<scale>].<ext>` next to the input).
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON job configuration; flags given on the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quantization method.
    #[arg(long, value_enum)]
    method: Option<MethodChoice>,

    /// Threshold level for `--method threshold` (clamped to 0..=255).
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<i64>,

    /// Seed for `random` and `jitter`.
    #[arg(long)]
    seed: Option<u64>,

    /// Resize factor applied before dithering.
    #[arg(long)]
    scale: Option<f64>,

    /// Process frames on a thread pool.
    #[arg(long)]
    parallel: bool,

    /// Worker threads for `--parallel` (defaults to the number of CPUs).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct ImageArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct GifArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Keep the first decoded frame instead of dropping it.
    #[arg(long)]
    keep_first_frame: bool,

    /// Multiply every frame duration by this factor.
    #[arg(long)]
    time_scale: Option<f64>,

    /// Loop count of the output (0 loops forever).
    #[arg(long)]
    loop_count: Option<u16>,
}

#[derive(Args, Debug)]
struct VideoArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Write a silent video.
    #[arg(long)]
    no_audio: bool,

    /// Audio codec passed to ffmpeg.
    #[arg(long)]
    audio_codec: Option<String>,

    /// Audio bitrate in kbit/s.
    #[arg(long)]
    audio_kbps: Option<u32>,

    /// Write a dithered GIF instead of a video.
    #[arg(long)]
    to_gif: bool,

    /// Frame rate of the `--to-gif` output (defaults to the source rate, at most 50).
    #[arg(long, requires = "to_gif")]
    gif_fps: Option<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodChoice {
    Threshold,
    Random,
    Bayer,
    Jitter,
    Floyd,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Image(args) => cmd_image(args),
        Command::Gif(args) => cmd_gif(args),
        Command::Video(args) => cmd_video(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "monoframe=debug" } else { "monoframe=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Applies `--method`, `--threshold` and `--seed` on top of the configured method. Parameters that
/// the resulting method does not take are rejected rather than ignored.
fn resolve_method(args: &CommonArgs, from_config: Method) -> anyhow::Result<Method> {
    let base = match args.method {
        None => from_config,
        Some(MethodChoice::Threshold) => Method::Threshold {
            level: DEFAULT_THRESHOLD,
        },
        Some(MethodChoice::Random) => Method::Random {
            seed: DEFAULT_RANDOM_SEED,
        },
        Some(MethodChoice::Bayer) => Method::OrderedBayer,
        Some(MethodChoice::Jitter) => Method::OrderedJitter {
            seed: DEFAULT_JITTER_SEED,
        },
        Some(MethodChoice::Floyd) => Method::ErrorDiffusion,
    };
    if args.threshold.is_some() && !matches!(base, Method::Threshold { .. }) {
        anyhow::bail!(
            "--threshold only applies to the threshold method (selected: {})",
            base.tag()
        );
    }
    if args.seed.is_some() && !matches!(base, Method::Random { .. } | Method::OrderedJitter { .. }) {
        anyhow::bail!(
            "--seed only applies to the random and jitter methods (selected: {})",
            base.tag()
        );
    }
    Ok(match base {
        Method::Threshold { .. } => args.threshold.map_or(base, Method::threshold_clamped),
        Method::Random { seed } => Method::Random {
            seed: args.seed.unwrap_or(seed),
        },
        Method::OrderedJitter { seed } => Method::OrderedJitter {
            seed: args.seed.unwrap_or(seed),
        },
        other => other,
    })
}

fn load_config(args: &CommonArgs) -> anyhow::Result<JobConfig> {
    let mut cfg = match &args.config {
        Some(path) => JobConfig::from_path(path)
            .with_context(|| format!("load job config '{}'", path.display()))?,
        None => JobConfig::default(),
    };
    cfg.method = resolve_method(args, cfg.method)?;
    if let Some(scale) = args.scale {
        cfg.scale = scale;
    }
    if args.parallel {
        cfg.threading.parallel = true;
    }
    if args.threads.is_some() {
        cfg.threading.threads = args.threads;
    }
    Ok(cfg)
}

fn output_or_default(args: &CommonArgs, conv: &Converter, kind: SourceKind) -> PathBuf {
    args.out
        .clone()
        .unwrap_or_else(|| conv.default_output(&args.in_path, kind))
}

fn ensure_input(path: &Path) -> anyhow::Result<()> {
    anyhow::ensure!(path.is_file(), "input '{}' does not exist", path.display());
    Ok(())
}

fn cmd_image(args: ImageArgs) -> anyhow::Result<()> {
    ensure_input(&args.common.in_path)?;
    let cfg = load_config(&args.common)?;
    let conv = Converter::new(cfg);
    let out = output_or_default(&args.common, &conv, SourceKind::Still);

    let report = conv
        .convert_still(&args.common.in_path, &out)
        .with_context(|| format!("convert '{}'", args.common.in_path.display()))?;
    eprintln!(
        "wrote {} ({}x{})",
        report.output.display(),
        report.canvas.width,
        report.canvas.height
    );
    Ok(())
}

fn cmd_gif(args: GifArgs) -> anyhow::Result<()> {
    ensure_input(&args.common.in_path)?;
    let mut cfg = load_config(&args.common)?;
    if args.keep_first_frame {
        cfg.first_frame = FirstFramePolicy::Keep;
    }
    if let Some(t) = args.time_scale {
        cfg.time_scale = t;
    }
    if args.loop_count.is_some() {
        cfg.loop_count = args.loop_count;
    }
    let conv = Converter::new(cfg);
    let out = output_or_default(&args.common, &conv, SourceKind::Animated);

    let report = conv
        .convert_animated(&args.common.in_path, &out)
        .with_context(|| format!("convert '{}'", args.common.in_path.display()))?;
    eprintln!(
        "wrote {} ({} frames, {}x{})",
        report.output.display(),
        report.frames,
        report.canvas.width,
        report.canvas.height
    );
    Ok(())
}

fn cmd_video(args: VideoArgs) -> anyhow::Result<()> {
    ensure_input(&args.common.in_path)?;
    let mut cfg = load_config(&args.common)?;
    anyhow::ensure!(
        FfmpegToolchain::new(cfg.timeouts).is_available(),
        "video conversion needs `ffmpeg` and `ffprobe` on PATH"
    );
    if args.no_audio {
        cfg.audio.include = false;
    }
    if let Some(codec) = args.audio_codec {
        cfg.audio.codec = codec;
    }
    if let Some(kbps) = args.audio_kbps {
        cfg.audio.bitrate_kbps = kbps;
    }
    if args.gif_fps.is_some() {
        cfg.gif_fps = args.gif_fps;
    }
    let conv = Converter::new(cfg);
    let input = &args.common.in_path;

    let report = if args.to_gif {
        let out = args.common.out.clone().unwrap_or_else(|| {
            let cfg = conv.config();
            output_path_for(input, &format!("{}Anim", cfg.method.tag()), cfg.scale, "gif")
        });
        conv.convert_video_to_gif(input, &out)
    } else {
        let out = output_or_default(&args.common, &conv, SourceKind::Video);
        conv.convert_video(input, &out)
    }
    .with_context(|| format!("convert '{}'", input.display()))?;

    eprintln!(
        "wrote {} ({} frames @ {} fps, audio: {:?})",
        report.output.display(),
        report.frames,
        report.fps.unwrap_or_default(),
        report.audio
    );
    Ok(())
}
