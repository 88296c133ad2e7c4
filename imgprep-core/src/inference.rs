//! Classification on top of a preprocessing pipeline and an ONNX model.

use anyhow::{Context, Result};
use image::DynamicImage;
use imgprep_utils::{ModelSettings, TensorLayout, timing_guard};
use log::debug;

use crate::{
    model::OnnxModel,
    pipeline::{PreprocessOutput, Preprocessing},
    shape::ImageShape,
};

/// One ranked model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: Option<String>,
    pub score: f32,
}

/// Predictions together with the preprocessed input they were computed from.
#[derive(Debug, Clone)]
pub struct Classification {
    pub input: PreprocessOutput,
    pub predictions: Vec<Prediction>,
}

/// Couples a [`Preprocessing`] pipeline with an [`OnnxModel`].
#[derive(Debug)]
pub struct Classifier {
    pipeline: Preprocessing,
    model: OnnxModel,
    layout: TensorLayout,
    top_k: usize,
    softmax: bool,
    labels: Vec<String>,
}

impl Classifier {
    /// Load the model described by `settings` and attach it to `pipeline`.
    pub fn new(pipeline: Preprocessing, settings: &ModelSettings) -> Result<Self> {
        let model = OnnxModel::load(&settings.path)?;
        Ok(Self::with_model(pipeline, model, settings))
    }

    pub fn with_model(pipeline: Preprocessing, model: OnnxModel, settings: &ModelSettings) -> Self {
        Self {
            pipeline,
            model,
            layout: settings.layout,
            top_k: settings.top_k,
            softmax: settings.softmax,
            labels: settings.labels.clone(),
        }
    }

    pub fn pipeline(&self) -> &Preprocessing {
        &self.pipeline
    }

    /// Classify the pipeline loader's single target file.
    pub fn run(&self) -> Result<Classification> {
        let input = self.pipeline.run()?;
        self.classify_preprocessed(input)
    }

    pub fn classify_image(&self, image: DynamicImage, name: &str) -> Result<Classification> {
        let input = self.pipeline.handle_image(image, name)?;
        self.classify_preprocessed(input)
    }

    fn classify_preprocessed(&self, input: PreprocessOutput) -> Result<Classification> {
        let dims = input_dims(input.shape, self.layout);
        let raw = {
            let _guard = timing_guard("imgprep_core::onnx_inference", log::Level::Debug);
            self.model
                .run(&input.data, &dims)
                .with_context(|| format!("inference with {} failed", self.model.path().display()))?
        };
        debug!("model produced {} scores", raw.len());

        let scores = if self.softmax { softmax(&raw) } else { raw };
        let predictions = top_k(&scores, self.top_k)
            .into_iter()
            .map(|(class_index, score)| Prediction {
                class_index,
                label: self.labels.get(class_index).cloned(),
                score,
            })
            .collect();

        Ok(Classification { input, predictions })
    }
}

/// Batch-of-one tensor dimensions for an image of `shape`.
pub fn input_dims(shape: ImageShape, layout: TensorLayout) -> [usize; 4] {
    let (w, h, c) = (
        shape.width as usize,
        shape.height as usize,
        shape.channels as usize,
    );
    match layout {
        TensorLayout::Nhwc => [1, h, w, c],
        TensorLayout::Nchw => [1, c, h, w],
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return exps;
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Indices and values of the `k` largest scores, highest first. Ties keep index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}
