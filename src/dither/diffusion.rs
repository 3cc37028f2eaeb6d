use crate::{
    foundation::core::{BinaryFrame, Frame},
    luma::luminance_rgb,
};

use super::Quantizer;

const MIDPOINT: f32 = 128.0;

/// Floyd-Steinberg weights as `(dx, dy, sixteenths)`, all towards unvisited pixels.
const KERNEL: [(i32, i32, f32); 4] = [(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

/// Per-pixel luminance grid that error diffusion writes into.
///
/// A field lives for exactly one quantization pass and is owned by whoever runs it.
#[derive(Clone, Debug, PartialEq)]
pub struct BrightnessField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl BrightnessField {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            values: frame.pixels().map(|p| f32::from(luminance_rgb(p))).collect(),
        }
    }

    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        (values.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[self.index(x, y)]
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().map(|v| f64::from(*v)).sum()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Adds `amount` at `(x, y)` when that position is inside the field.
    fn add(&mut self, x: i64, y: i64, amount: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = self.index(x as u32, y as u32);
        self.values[i] += amount;
    }
}

/// Floyd-Steinberg error diffusion at a fixed midpoint of 128.
///
/// ```text
///        X   7
///    3   5   1
/// ```
///
/// Each decision depends on all earlier ones, so a frame is always processed on one thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FloydSteinberg;

impl FloydSteinberg {
    /// Runs the diffusion pass over `field`, leaving the error-adjusted values in it.
    pub fn diffuse(&self, field: &mut BrightnessField) -> BinaryFrame {
        let (w, h) = (field.width, field.height);
        if w == 0 || h == 0 {
            return BinaryFrame::empty(w, h);
        }
        let mut white = Vec::with_capacity(field.values.len());
        for y in 0..h {
            for x in 0..w {
                let value = field.get(x, y);
                let is_white = value >= MIDPOINT;
                let error = value - if is_white { 255.0 } else { 0.0 };
                white.push(is_white);
                for (dx, dy, weight) in KERNEL {
                    field.add(
                        i64::from(x) + i64::from(dx),
                        i64::from(y) + i64::from(dy),
                        error * weight / 16.0,
                    );
                }
            }
        }
        BinaryFrame::from_decisions(w, h, white)
    }
}

impl Quantizer for FloydSteinberg {
    fn quantize(&self, frame: &Frame) -> BinaryFrame {
        let mut field = BrightnessField::from_frame(frame);
        self.diffuse(&mut field)
    }
}
