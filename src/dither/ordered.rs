use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::foundation::core::{BinaryFrame, Frame};

use super::{Quantizer, decide_row_major};

/// 4x4 Bayer index matrix; every value in `0..16` appears exactly once.
pub const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

const JITTER: i32 = 16;

/// Threshold of the tiled Bayer pattern at `(x, y)`: `floor((M + 0.5) * 255 / 16)`.
pub fn bayer_threshold(x: u32, y: u32) -> u8 {
    let m = u32::from(BAYER_4X4[(y % 4) as usize][(x % 4) as usize]);
    // (m + 0.5) * 255 / 16 == (2m + 1) * 255 / 32
    ((2 * m + 1) * 255 / 32) as u8
}

/// Ordered dithering with the tiled 4x4 Bayer matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderedBayer;

impl Quantizer for OrderedBayer {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        decide_row_major(frame, |x, y, l| l >= bayer_threshold(x, y))
    }
}

/// Bayer thresholds perturbed by a uniform jitter in `[-16, 16]`, clamped to `[0, 255]`.
///
/// Breaks up the regular cross-hatch of plain Bayer dithering. One jitter value is drawn per
/// pixel in row-major order from a ChaCha8 generator seeded once per image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderedJitter {
    pub seed: u64,
}

impl Quantizer for OrderedJitter {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        decide_row_major(frame, |x, y, l| {
            let jitter = rng.gen_range(-JITTER..=JITTER);
            let t = (i32::from(bayer_threshold(x, y)) + jitter).clamp(0, 255);
            i32::from(l) >= t
        })
    }
}
