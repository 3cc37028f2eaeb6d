use crate::foundation::core::{BinaryFrame, Frame};

use super::{Quantizer, decide_row_major};

/// White where luminance reaches `level`, black elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Threshold {
    pub level: u8,
}

impl Quantizer for Threshold {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        decide_row_major(frame, |_, _, l| l >= self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_gray_splits_on_level() {
        let gray = Frame::filled(4, 4, [127, 127, 127]);
        let dark = Threshold { level: 128 }.quantize(&gray);
        assert_eq!(dark.white_count(), 0);
        assert_eq!(dark.into_frame(), Frame::filled(4, 4, [0, 0, 0]));

        let light = Threshold { level: 127 }.quantize(&gray);
        assert_eq!(light.white_count(), 16);
        assert_eq!(light.into_frame(), Frame::filled(4, 4, [255, 255, 255]));
    }

    #[test]
    fn rerunning_on_own_output_is_identity() {
        let src = Frame::from_fn(9, 7, |x, y| [(x * 28) as u8, (y * 36) as u8, 90]);
        for level in [0u8, 1, 64, 128, 200, 255] {
            let q = Threshold { level };
            let once = q.quantize(&src).into_frame();
            let twice = q.quantize(&once).into_frame();
            assert_eq!(once, twice, "level {level}");
        }
    }

    #[test]
    fn level_zero_is_all_white() {
        let src = Frame::filled(3, 2, [0, 0, 0]);
        assert_eq!(Threshold { level: 0 }.quantize(&src).white_count(), 6);
    }
}
