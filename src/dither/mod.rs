//! Black/white quantization strategies.
//!
//! Every strategy maps a [`Frame`] to a [`BinaryFrame`] of the same size. Pixels are visited in
//! row-major order (left to right, top to bottom); the seeded strategies depend on that order
//! for reproducibility, and error diffusion depends on it for correctness.

mod diffusion;
mod ordered;
mod random;
mod threshold;

pub use diffusion::{BrightnessField, FloydSteinberg};
pub use ordered::{BAYER_4X4, OrderedBayer, OrderedJitter, bayer_threshold};
pub use random::RandomDither;
pub use threshold::Threshold;

use crate::{
    foundation::core::{BinaryFrame, Frame},
    luma::luminance_rgb,
};

/// Seed the still-image random strategy starts from.
pub const DEFAULT_RANDOM_SEED: u64 = 0;
/// Seed the jittered ordered strategy uses for every image.
pub const DEFAULT_JITTER_SEED: u64 = 0xC0FFEE;
/// Threshold used when none is given.
pub const DEFAULT_THRESHOLD: u8 = 128;
/// Stride between per-frame random seeds in animated runs.
pub const FRAME_SEED_STRIDE: u64 = 7919;

/// A quantization strategy.
pub trait Quantizer {
    fn quantize(&self, frame: &Frame) -> BinaryFrame;
}

/// Selector over the available strategies, with their parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    Threshold {
        #[serde(default = "default_threshold")]
        level: u8,
    },
    Random {
        #[serde(default)]
        seed: u64,
    },
    OrderedBayer,
    OrderedJitter {
        #[serde(default = "default_jitter_seed")]
        seed: u64,
    },
    ErrorDiffusion,
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}

fn default_jitter_seed() -> u64 {
    DEFAULT_JITTER_SEED
}

impl Default for Method {
    fn default() -> Self {
        Self::ErrorDiffusion
    }
}

impl Method {
    /// Threshold with a caller-supplied level clamped into `0..=255`.
    pub fn threshold_clamped(level: i64) -> Self {
        Self::Threshold {
            level: level.clamp(0, 255) as u8,
        }
    }

    /// The method to apply to frame `index` of an animated sequence.
    ///
    /// Random dithering gets a different seed per frame so the noise is not frozen in place;
    /// the other methods are returned unchanged.
    pub fn for_frame(self, index: usize) -> Self {
        match self {
            Self::Random { seed } => Self::Random {
                seed: seed.wrapping_add((index as u64).wrapping_mul(FRAME_SEED_STRIDE)),
            },
            other => other,
        }
    }

    /// Short name used in output file names.
    pub fn tag(self) -> String {
        match self {
            Self::Threshold { level } => format!("threshold{level}"),
            Self::Random { .. } => "random".to_string(),
            Self::OrderedBayer => "orderedBayer".to_string(),
            Self::OrderedJitter { .. } => "orderedAvoidCluster".to_string(),
            Self::ErrorDiffusion => "floydSteinberg".to_string(),
        }
    }
}

impl Quantizer for Method {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        match *self {
            Self::Threshold { level } => Threshold { level }.quantize(frame),
            Self::Random { seed } => RandomDither { seed }.quantize(frame),
            Self::OrderedBayer => OrderedBayer.quantize(frame),
            Self::OrderedJitter { seed } => OrderedJitter { seed }.quantize(frame),
            Self::ErrorDiffusion => FloydSteinberg.quantize(frame),
        }
    }
}

/// Decide every pixel from its position and luminance, in row-major order.
pub(crate) fn decide_row_major(
    frame: &Frame,
    mut decide: impl FnMut(u32, u32, u8) -> bool,
) -> BinaryFrame {
    if frame.is_empty() {
        return BinaryFrame::empty(frame.width(), frame.height());
    }
    let w = frame.width() as usize;
    let white = frame
        .pixels()
        .enumerate()
        .map(|(i, rgb)| decide((i % w) as u32, (i / w) as u32, luminance_rgb(rgb)))
        .collect();
    BinaryFrame::from_decisions(frame.width(), frame.height(), white)
}
