use anyhow::Result;

use crate::frame::InputTensor;

/// Obstacle classifier backend trait.
///
/// A backend maps one decoded single-channel frame to the probability that
/// an obstacle is close ahead. The value must lie in [0, 1]; the pipeline
/// clamps anything outside that range and rejects non-finite outputs.
///
/// Backends run synchronously on the perception thread, so `predict` blocks
/// the read loop for its full duration.
pub trait ObstacleClassifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Fixed input size `(width, height)` when the model requires one.
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Run the classifier on one frame.
    fn predict(&mut self, input: &InputTensor) -> Result<f32>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
