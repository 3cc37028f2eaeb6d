use crate::foundation::error::{MonoframeError, MonoframeResult};

/// Nominal canvas geometry of a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Display duration in hundredths of a second (the GIF delay unit).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Centis(pub u32);

impl Centis {
    /// Delay used when a source does not say how long a frame is shown.
    pub const DEFAULT_FRAME: Centis = Centis(10);

    pub fn as_millis(self) -> u32 {
        self.0.saturating_mul(10)
    }

    /// Durations for `count` frames at a constant rate whose running total tracks the exact
    /// timeline: frame `i` ends at `round((i + 1) * 100 / fps)` cs.
    pub fn timeline(fps: f64, count: usize) -> Vec<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return vec![Self::DEFAULT_FRAME; count];
        }
        let end = |i: usize| (i as f64 * 100.0 / fps).round() as u32;
        (0..count).map(|i| Self(end(i + 1) - end(i))).collect()
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self((f64::from(self.0) * factor).round().max(0.0) as u32)
    }
}

pub const BLACK: [u8; 3] = [0x00, 0x00, 0x00];
pub const WHITE: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Row-major RGB8 pixels (3 bytes per sample).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MonoframeResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(MonoframeError::invalid_argument(format!(
                "frame data has {} bytes, expected {expected} for {width}x{height} rgb8",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let n = width as usize * height as usize;
        let mut data = Vec::with_capacity(n * 3);
        for _ in 0..n {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGB8 bytes, `width * height * 3` long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Samples in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    /// True when every sample is pure black or pure white.
    pub fn is_binary(&self) -> bool {
        self.pixels().all(|p| p == BLACK || p == WHITE)
    }

    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Alpha is dropped; the frame is an opaque RGB canvas.
    pub fn from_dynamic(img: image::DynamicImage) -> Self {
        Self::from_rgb_image(img.into_rgb8())
    }

    pub fn into_rgb_image(self) -> MonoframeResult<image::RgbImage> {
        let (w, h) = (self.width, self.height);
        image::RgbImage::from_raw(w, h, self.data).ok_or_else(|| {
            MonoframeError::invalid_argument(format!("frame buffer does not match {w}x{h}"))
        })
    }

    pub fn to_rgb_image(&self) -> MonoframeResult<image::RgbImage> {
        self.clone().into_rgb_image()
    }
}

/// Output of a quantization strategy: one on/off decision per pixel.
///
/// Only the strategies build these, so a `BinaryFrame` can never hold a third color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryFrame {
    width: u32,
    height: u32,
    white: Vec<bool>,
}

impl BinaryFrame {
    pub(crate) fn from_decisions(width: u32, height: u32, white: Vec<bool>) -> Self {
        debug_assert_eq!(white.len(), width as usize * height as usize);
        Self {
            width,
            height,
            white,
        }
    }

    pub(crate) fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            white: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_white(&self, x: u32, y: u32) -> bool {
        self.white[y as usize * self.width as usize + x as usize]
    }

    pub fn white_count(&self) -> usize {
        self.white.iter().filter(|w| **w).count()
    }

    pub fn decisions(&self) -> &[bool] {
        &self.white
    }

    pub fn into_frame(self) -> Frame {
        let mut data = Vec::with_capacity(self.white.len() * 3);
        for w in self.white {
            data.extend_from_slice(if w { &WHITE } else { &BLACK });
        }
        Frame {
            width: self.width,
            height: self.height,
            data,
        }
    }
}
