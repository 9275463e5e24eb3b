use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::ObstacleClassifier;
use crate::frame::InputTensor;

/// Stub backend for testing and dry runs. Ignores pixel content.
///
/// A scripted stub replays its outputs in order and then repeats the last
/// one, so a short script still drives an arbitrarily long run.
pub struct StubClassifier {
    script: VecDeque<f32>,
    last: f32,
}

impl StubClassifier {
    /// Always report the same probability.
    pub fn constant(probability: f32) -> Self {
        Self {
            script: VecDeque::new(),
            last: probability,
        }
    }

    /// Report `outputs` one per frame, then keep repeating the final value.
    pub fn scripted(outputs: impl IntoIterator<Item = f32>) -> Self {
        Self {
            script: outputs.into_iter().collect(),
            last: 0.0,
        }
    }
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl ObstacleClassifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, _input: &InputTensor) -> Result<f32> {
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }
}
