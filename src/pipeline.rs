use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rayon::prelude::*;

use crate::{
    dither::{Method, Quantizer},
    foundation::{
        core::{BinaryFrame, Canvas, Frame},
        error::{MonoframeError, MonoframeResult},
    },
    sequence::AnimatedSequence,
    transform::{resize, scaled_dimensions, validate_scale},
};

/// Resize then quantize a single frame.
pub fn process_frame(frame: Frame, method: Method, scale: f64) -> MonoframeResult<BinaryFrame> {
    let resized = resize(frame, scale)?;
    Ok(method.quantize(&resized))
}

/// Frame-level threading configuration.
///
/// Frames are independent units of work; error diffusion inside one frame always stays on a
/// single worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Threading {
    pub parallel: bool,
    pub threads: Option<usize>,
}

/// Shared flag for abandoning a run between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for [`process_sequence`].
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub method: Method,
    /// Resize factor applied to every frame before quantization.
    pub scale: f64,
    /// Multiplier applied to every frame duration.
    pub time_scale: f64,
    pub threading: Threading,
    pub cancel: Option<CancelFlag>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            scale: 1.0,
            time_scale: 1.0,
            threading: Threading::default(),
            cancel: None,
        }
    }
}

impl PipelineOptions {
    pub fn new(method: Method, scale: f64) -> Self {
        Self {
            method,
            scale,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MonoframeResult<()> {
        validate_scale(self.scale)?;
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(MonoframeError::invalid_argument(format!(
                "time_scale must be a finite number > 0 (got {})",
                self.time_scale
            )));
        }
        if self.threading.threads == Some(0) {
            return Err(MonoframeError::invalid_argument(
                "threading 'threads' must be >= 1 when set",
            ));
        }
        Ok(())
    }

    fn check_cancelled(&self) -> MonoframeResult<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(MonoframeError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_in: usize,
    pub frames_out: usize,
    pub parallel: bool,
}

/// Resize and quantize every frame of `seq`.
///
/// The result has the same number of frames in the same order, durations multiplied by
/// `time_scale`, the input loop count, and a canvas equal to the scaled first frame.
pub fn process_sequence(
    seq: AnimatedSequence,
    opts: &PipelineOptions,
) -> MonoframeResult<AnimatedSequence> {
    process_sequence_with_stats(seq, opts).map(|(out, _)| out)
}

/// Like [`process_sequence`] but leaves `seq` intact for another run.
pub fn process_sequence_ref(
    seq: &AnimatedSequence,
    opts: &PipelineOptions,
) -> MonoframeResult<AnimatedSequence> {
    process_sequence(seq.clone(), opts)
}

#[tracing::instrument(skip(seq, opts), fields(frames = seq.len(), method = ?opts.method))]
pub fn process_sequence_with_stats(
    seq: AnimatedSequence,
    opts: &PipelineOptions,
) -> MonoframeResult<(AnimatedSequence, PipelineStats)> {
    opts.validate()?;
    seq.check_uniform_geometry()?;

    let (frames, durations, loop_count, canvas) = seq.into_parts();
    let canvas = match frames.first() {
        Some(first) => {
            let (w, h) = scaled_dimensions(first.width(), first.height(), opts.scale)?;
            Canvas::new(w, h)
        }
        None => {
            let (w, h) = scaled_dimensions(canvas.width, canvas.height, opts.scale)?;
            Canvas::new(w, h)
        }
    };

    let frames_in = frames.len();
    let out_frames = if opts.threading.parallel && frames_in > 1 {
        let pool = build_thread_pool(opts.threading.threads)?;
        process_parallel(frames, opts, &pool)?
    } else {
        process_sequential(frames, opts)?
    };

    let durations = durations
        .into_iter()
        .map(|d| d.scaled(opts.time_scale))
        .collect();

    let out = AnimatedSequence::new(out_frames, durations, loop_count, canvas)?;
    let stats = PipelineStats {
        frames_in,
        frames_out: out.len(),
        parallel: opts.threading.parallel,
    };
    tracing::debug!(?stats, width = canvas.width, height = canvas.height, "sequence processed");
    Ok((out, stats))
}

fn process_indexed(idx: usize, frame: Frame, opts: &PipelineOptions) -> MonoframeResult<Frame> {
    opts.check_cancelled()?;
    let method = opts.method.for_frame(idx);
    Ok(process_frame(frame, method, opts.scale)?.into_frame())
}

fn process_sequential(frames: Vec<Frame>, opts: &PipelineOptions) -> MonoframeResult<Vec<Frame>> {
    frames
        .into_iter()
        .enumerate()
        .map(|(idx, frame)| process_indexed(idx, frame, opts))
        .collect()
}

fn process_parallel(
    frames: Vec<Frame>,
    opts: &PipelineOptions,
    pool: &rayon::ThreadPool,
) -> MonoframeResult<Vec<Frame>> {
    // Indexed collect keeps input order regardless of which worker finishes first.
    let processed = pool.install(|| {
        frames
            .into_par_iter()
            .enumerate()
            .map(|(idx, frame)| process_indexed(idx, frame, opts))
            .collect::<Vec<_>>()
    });
    processed.into_iter().collect()
}

fn build_thread_pool(threads: Option<usize>) -> MonoframeResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(MonoframeError::invalid_argument(
            "threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| MonoframeError::resource(format!("failed to build rayon thread pool: {e}")))
}
