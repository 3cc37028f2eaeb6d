use crate::foundation::{
    core::{Canvas, Centis, Frame},
    error::{MonoframeError, MonoframeResult},
};

/// Ordered frames with one display duration each.
///
/// `frames.len() == durations.len()` always holds; the fields are private so it cannot be broken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimatedSequence {
    frames: Vec<Frame>,
    durations: Vec<Centis>,
    /// Number of repeats; 0 loops forever.
    pub loop_count: u16,
    pub canvas: Canvas,
}

impl AnimatedSequence {
    pub fn new(
        frames: Vec<Frame>,
        durations: Vec<Centis>,
        loop_count: u16,
        canvas: Canvas,
    ) -> MonoframeResult<Self> {
        if frames.len() != durations.len() {
            return Err(MonoframeError::invalid_argument(format!(
                "sequence has {} frames but {} durations",
                frames.len(),
                durations.len()
            )));
        }
        Ok(Self {
            frames,
            durations,
            loop_count,
            canvas,
        })
    }

    /// A still image as a one-frame sequence.
    pub fn single(frame: Frame) -> Self {
        let canvas = Canvas::new(frame.width(), frame.height());
        Self {
            frames: vec![frame],
            durations: vec![Centis::DEFAULT_FRAME],
            loop_count: 0,
            canvas,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn durations(&self) -> &[Centis] {
        &self.durations
    }

    pub fn into_parts(self) -> (Vec<Frame>, Vec<Centis>, u16, Canvas) {
        (self.frames, self.durations, self.loop_count, self.canvas)
    }

    pub fn total_duration(&self) -> Centis {
        Centis(self.durations.iter().map(|d| d.0).sum())
    }

    /// Drops the first frame and its duration.
    pub fn drop_first(&mut self) -> Option<(Frame, Centis)> {
        if self.frames.is_empty() {
            return None;
        }
        Some((self.frames.remove(0), self.durations.remove(0)))
    }

    /// Fails unless every frame has the dimensions of the first one.
    pub fn check_uniform_geometry(&self) -> MonoframeResult<()> {
        let Some(first) = self.frames.first() else {
            return Ok(());
        };
        for (idx, f) in self.frames.iter().enumerate().skip(1) {
            if f.dimensions() != first.dimensions() {
                return Err(MonoframeError::invalid_argument(format!(
                    "frame {idx} is {}x{} but frame 0 is {}x{}",
                    f.width(), f.height(), first.width(), first.height()
                )));
            }
        }
        Ok(())
    }
}

/// What to do with the first decoded frame of an animation.
///
/// Some GIF encoders emit a setup frame ahead of the visible ones; `SkipWhenAnimated` drops it
/// (together with its duration) whenever the sequence has more than one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstFramePolicy {
    Keep,
    #[default]
    SkipWhenAnimated,
}

impl FirstFramePolicy {
    /// Applies the policy; returns whether a frame was dropped.
    pub fn apply(self, seq: &mut AnimatedSequence) -> bool {
        match self {
            Self::Keep => false,
            Self::SkipWhenAnimated if seq.len() > 1 => seq.drop_first().is_some(),
            Self::SkipWhenAnimated => false,
        }
    }
}
