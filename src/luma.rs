//! Perceptual brightness of an RGB sample.
//!
//! Rec. 709 weights `0.2126 R + 0.7152 G + 0.0722 B`, truncated to an integer. The weights are
//! applied in fixed point (parts per 10 000) so the truncation is exact: pure white is 255 and
//! pure black is 0.

const WR: u32 = 2126;
const WG: u32 = 7152;
const WB: u32 = 722;
const SCALE: u32 = 10_000;

pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let sum = WR * u32::from(r) + WG * u32::from(g) + WB * u32::from(b);
    (sum / SCALE) as u8
}

#[inline]
pub fn luminance_rgb(rgb: [u8; 3]) -> u8 {
    luminance(rgb[0], rgb[1], rgb[2])
}
