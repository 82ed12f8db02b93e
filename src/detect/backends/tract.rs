#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Tract-based backend for ONNX frame classifiers.
///
/// Loads a local model with a `1x3xHxW` float input and a single score vector
/// output, one score per class label. Frames are resized to the model input
/// and scaled to `[0, 1]`. Raw logits are normalized with a softmax unless the
/// output already sums to one.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
    min_score: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        labels: Vec<String>,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("tract backend needs at least one class label"));
        }
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
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
            labels,
            min_score: 0.01,
        })
    }

    /// Drop classes scoring below `min_score` from the result.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = if image.width() == self.width && image.height() == self.height {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<Vec<f32>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let raw: Vec<f32> = view.iter().copied().collect();
        if raw.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                raw.len(),
                self.labels.len()
            ));
        }
        Ok(normalize_scores(raw))
    }
}

fn normalize_scores(raw: Vec<f32>) -> Vec<f32> {
    let sum: f32 = raw.iter().sum();
    let already_probabilities =
        raw.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if already_probabilities {
        return raw;
    }
    let max = raw.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = raw.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let scores = self.extract_scores(outputs)?;

        let mut detections: Vec<Detection> = self
            .labels
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score >= self.min_score)
            .map(|(label, score)| Detection::new(label.clone(), score))
            .collect();
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(DetectionResult::new(detections))
    }
}
