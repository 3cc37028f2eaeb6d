//! 1-bit (black/white) dithering for still images, animated GIFs and videos.
//!
//! Decoding and encoding go through the [`FrameCodec`] and [`VideoToolchain`] traits; the
//! pipeline in between resizes and quantizes every frame with one of the [`Method`]s.
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod convert;
pub mod dither;
mod foundation;
pub mod luma;
pub mod pipeline;
pub mod sequence;
pub mod stage;
pub mod transform;

pub use codec::{
    DecodedSource, FfmpegToolchain, FrameCodec, ImageCodec, ToolTimeouts, VideoToolchain,
    is_ffmpeg_on_path, is_ffprobe_on_path,
};
pub use config::{AudioConfig, JobConfig};
pub use convert::{AudioOutcome, ConversionReport, Converter, SourceKind, output_path_for};
pub use dither::{Method, Quantizer};
pub use foundation::core::{BLACK, BinaryFrame, Canvas, Centis, Frame, WHITE};
pub use foundation::error::{MonoframeError, MonoframeResult};
pub use pipeline::{
    CancelFlag, PipelineOptions, PipelineStats, Threading, process_frame, process_sequence,
    process_sequence_ref, process_sequence_with_stats,
};
pub use sequence::{AnimatedSequence, FirstFramePolicy};
pub use stage::{Stage, StageTracker};
