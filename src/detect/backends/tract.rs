#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::ObstacleClassifier;
use crate::frame::InputTensor;

/// Tract-based backend for ONNX inference.
///
/// Loads a local model taking a `(1, height, width, 1)` f32 tensor and
/// producing the obstacle probability as its first output element.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, height as usize, width as usize, 1),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.width() != self.width || input.height() != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            ));
        }

        let shape = input.shape();
        let array = tract_ndarray::Array4::from_shape_vec(
            (shape[0], shape[1], shape[2], shape[3]),
            input.pixels().to_vec(),
        )
        .context("input tensor shape mismatch")?;
        Ok(array.into_tensor())
    }

    fn extract_probability(&self, outputs: TVec<TValue>) -> Result<f32> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let probability = scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output tensor was empty"))?;
        if !probability.is_finite() {
            return Err(anyhow!("model produced non-finite output {}", probability));
        }
        Ok(probability.clamp(0.0, 1.0))
    }
}

impl ObstacleClassifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn predict(&mut self, input: &InputTensor) -> Result<f32> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_probability(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.width as usize) * (self.height as usize)];
        let input = InputTensor::from_luma8(self.width, self.height, &blank)
            .ok_or_else(|| anyhow!("invalid warm-up tensor"))?;
        self.predict(&input).map(|_| ())
    }
}
