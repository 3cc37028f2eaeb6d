//! Frame resampling. Always applied before quantization: resampling an already dithered frame
//! would smear the pattern into grays.

use image::imageops::{self, FilterType};

use crate::foundation::{
    core::Frame,
    error::{MonoframeError, MonoframeResult},
};

/// Checks that `scale` is a usable resize factor.
pub fn validate_scale(scale: f64) -> MonoframeResult<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(MonoframeError::invalid_argument(format!(
            "scale must be a finite number > 0 (got {scale})"
        )));
    }
    Ok(())
}

/// Output dimensions for `scale`: each side rounded, never below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> MonoframeResult<(u32, u32)> {
    validate_scale(scale)?;
    let side = |v: u32| -> u32 {
        let s = (f64::from(v) * scale).round();
        if s >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            (s as u32).max(1)
        }
    };
    Ok((side(width), side(height)))
}

/// Resizes `frame` by `scale` with a Lanczos filter.
///
/// A scale of exactly 1.0 returns the input untouched.
pub fn resize(frame: Frame, scale: f64) -> MonoframeResult<Frame> {
    let (w, h) = scaled_dimensions(frame.width(), frame.height(), scale)?;
    if scale == 1.0 || (w, h) == frame.dimensions() {
        return Ok(frame);
    }
    if frame.is_empty() {
        return Ok(Frame::filled(w, h, [0, 0, 0]));
    }
    let src = frame.into_rgb_image()?;
    let out = imageops::resize(&src, w, h, FilterType::Lanczos3);
    Ok(Frame::from_rgb_image(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_scale_keeps_dimensions_and_pixels() {
        let f = Frame::from_fn(7, 5, |x, y| [x as u8, y as u8, 3]);
        let out = resize(f.clone(), 1.0).unwrap();
        assert_eq!(out, f);
    }

    #[test]
    fn non_positive_scale_is_invalid_argument() {
        for s in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = resize(Frame::filled(2, 2, [0, 0, 0]), s).unwrap_err();
            assert!(matches!(err, MonoframeError::InvalidArgument(_)), "{s}");
        }
    }

    #[test]
    fn dimensions_round_and_floor_at_one() {
        assert_eq!(scaled_dimensions(10, 4, 0.5).unwrap(), (5, 2));
        assert_eq!(scaled_dimensions(10, 5, 0.25).unwrap(), (3, 1));
        assert_eq!(scaled_dimensions(3, 3, 0.01).unwrap(), (1, 1));
        assert_eq!(scaled_dimensions(3, 2, 2.5).unwrap(), (8, 5));
    }

    #[test]
    fn resize_changes_dimensions_and_keeps_flat_color() {
        let f = Frame::filled(8, 6, [200, 100, 50]);
        let out = resize(f, 0.5).unwrap();
        assert_eq!(out.dimensions(), (4, 3));
        for p in out.pixels() {
            assert!((i16::from(p[0]) - 200).abs() <= 1);
            assert!((i16::from(p[1]) - 100).abs() <= 1);
            assert!((i16::from(p[2]) - 50).abs() <= 1);
        }

        let up = resize(Frame::filled(2, 2, [10, 10, 10]), 3.0).unwrap();
        assert_eq!(up.dimensions(), (6, 6));
    }
}
