// THEORY:
// The production `Classifier`: an ONNX model run in-process with tract. The
// model is loaded and optimized once for a fixed input shape; each call only
// preprocesses the image into a channels-last tensor and runs inference.

#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use tract_onnx::prelude::*;

use crate::core_modules::classifier::{ClassificationScore, Classifier};
use crate::core_modules::preprocess::{PreprocessOptions, prepare_tile};

/// ONNX binary court classifier run with tract.
///
/// The model takes a single `1 x H x W x 3` f32 tensor (channels last, values in
/// [0, 1]) and produces a single sigmoid output.
pub struct TractClassifier {
    model: TypedRunnableModel<TypedModel>,
    options: PreprocessOptions,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, options: PreprocessOptions) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, options.input_height as usize, options.input_width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, options })
    }
}

/// Preprocesses `image` into a `1 x H x W x 3` tensor.
fn input_tensor(image: &DynamicImage, options: &PreprocessOptions) -> Result<Tensor> {
    let prepared = prepare_tile(image, options);
    let (height, width) = (prepared.height as usize, prepared.width as usize);
    let input = tract_ndarray::Array4::from_shape_vec((1, height, width, 3), prepared.pixels)
        .context("prepared tile does not match model input shape")?;
    Ok(input.into_tensor())
}

impl Classifier for TractClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<ClassificationScore> {
        let input = input_tensor(image, &self.options)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let score = scores
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model output tensor was empty"))?;
        ClassificationScore::new(score as f64)
    }
}
