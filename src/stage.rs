use std::fmt;

use crate::foundation::error::{MonoframeError, MonoframeResult};

/// Lifecycle of one conversion run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Decoding,
    Quantizing,
    Encoding,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Decoding),
            Self::Decoding => Some(Self::Quantizing),
            Self::Quantizing => Some(Self::Encoding),
            Self::Encoding => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Decoding => "decoding",
            Self::Quantizing => "quantizing",
            Self::Encoding => "encoding",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Enforces `Idle -> Decoding -> Quantizing -> Encoding -> Done`, with `Failed` reachable from
/// any working stage.
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
    label: String,
}

impl StageTracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            current: Stage::Idle,
            label: label.into(),
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, to: Stage) -> MonoframeResult<()> {
        if self.current.next() != Some(to) {
            return Err(MonoframeError::Other(anyhow::anyhow!(
                "illegal stage transition {} -> {to} ({})",
                self.current,
                self.label
            )));
        }
        tracing::debug!(run = %self.label, from = %self.current, to = %to, "stage");
        self.current = to;
        Ok(())
    }

    pub fn fail(&mut self, err: &MonoframeError) {
        if self.current.is_terminal() || self.current == Stage::Idle {
            return;
        }
        tracing::warn!(run = %self.label, stage = %self.current, error = %err, "run failed");
        self.current = Stage::Failed;
    }

    /// Enters `stage` and runs `f`, moving to `Failed` when it errors.
    pub fn run<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> MonoframeResult<T>,
    ) -> MonoframeResult<T> {
        self.advance(stage)?;
        f().inspect_err(|e| self.fail(e))
    }

    pub fn finish(&mut self) -> MonoframeResult<()> {
        self.advance(Stage::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_stage() {
        let mut t = StageTracker::new("t");
        for s in [Stage::Decoding, Stage::Quantizing, Stage::Encoding] {
            t.run(s, || Ok(())).unwrap();
            assert_eq!(t.current(), s);
        }
        t.finish().unwrap();
        assert_eq!(t.current(), Stage::Done);
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut t = StageTracker::new("t");
        assert!(t.advance(Stage::Encoding).is_err());
        assert_eq!(t.current(), Stage::Idle);
    }

    #[test]
    fn errors_move_to_failed() {
        let mut t = StageTracker::new("t");
        let r: MonoframeResult<()> = t.run(Stage::Decoding, || Err(MonoframeError::decode("nope")));
        assert!(r.is_err());
        assert_eq!(t.current(), Stage::Failed);
        assert!(t.advance(Stage::Quantizing).is_err());
    }
}
