use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::foundation::core::{BinaryFrame, Frame};

use super::{Quantizer, decide_row_major};

/// Compares each pixel against a fresh uniform draw from `[0, 256)`.
///
/// The generator is ChaCha8 seeded per call and consumed strictly in row-major order, so the same
/// seed and frame size give the same pattern on every platform and release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomDither {
    pub seed: u64,
}

impl Quantizer for RandomDither {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        decide_row_major(frame, |_, _, l| {
            let r: u16 = rng.gen_range(0..256);
            u16::from(l) >= r
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Frame {
        Frame::from_fn(32, 16, |x, y| {
            let v = (x * 8) as u8;
            [v, v, (y * 16) as u8]
        })
    }

    #[test]
    fn same_seed_is_reproducible() {
        let src = ramp();
        let a = RandomDither { seed: 99 }.quantize(&src).into_frame();
        let b = RandomDither { seed: 99 }.quantize(&src).into_frame();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn seeded_pattern_is_pinned() {
        let src = Frame::filled(16, 1, [128, 128, 128]);
        let out = RandomDither { seed: 7 }.quantize(&src);
        let (t, f) = (true, false);
        assert_eq!(
            out.decisions(),
            &[t, t, t, t, t, f, t, f, t, f, f, t, t, t, t, f]
        );
    }

    #[test]
    fn different_seeds_give_different_noise() {
        let src = Frame::filled(32, 32, [128, 128, 128]);
        let a = RandomDither { seed: 1 }.quantize(&src);
        let b = RandomDither { seed: 2 }.quantize(&src);
        assert_ne!(a, b);
    }

    #[test]
    fn extremes_are_fixed() {
        let white = Frame::filled(8, 8, [255, 255, 255]);
        assert_eq!(RandomDither { seed: 5 }.quantize(&white).white_count(), 64);
        // L = 0 is white only when the draw is exactly 0.
        let black = Frame::filled(64, 64, [0, 0, 0]);
        let n = RandomDither { seed: 5 }.quantize(&black).white_count();
        assert!(n < 64, "{n}");
    }

    #[test]
    fn white_fraction_tracks_luminance() {
        let src = Frame::filled(64, 64, [64, 64, 64]);
        let n = RandomDither { seed: 11 }.quantize(&src).white_count() as f64;
        let frac = n / 4096.0;
        // P(64 >= r) = 65/256
        assert!((frac - 65.0 / 256.0).abs() < 0.05, "{frac}");
    }
}
