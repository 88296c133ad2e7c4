//! Operations applied to the flat `f32` buffer produced from the final image.
//!
//! Buffers arrive interleaved (height, width, channel). [`ChannelsFirst`] reorders them to
//! (channel, height, width), so per-channel operations must run before it.

use std::fmt;

use anyhow::{Context, Result};
use imgprep_utils::{InputMode, TensorOpSettings};
use ndarray::Array3;

use crate::{error::PipelineError, shape::ImageShape};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const CAFFE_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// A single tensor-stage transformation.
pub trait TensorOperation: Send + Sync + fmt::Debug {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transform `data`, which holds an image of the given concrete `shape`.
    fn apply(&self, data: Vec<f32>, shape: ImageShape) -> Result<Vec<f32>>;
}

/// Divide every value by `scale` (255 maps bytes into `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescaling {
    pub scale: f32,
}

impl Rescaling {
    pub const fn new(scale: f32) -> Self {
        Self { scale }
    }
}

impl Default for Rescaling {
    fn default() -> Self {
        Self::new(255.0)
    }
}

impl TensorOperation for Rescaling {
    fn name(&self) -> &'static str {
        "rescaling"
    }

    fn apply(&self, mut data: Vec<f32>, _shape: ImageShape) -> Result<Vec<f32>> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return Err(PipelineError::invalid(
                self.name(),
                format!("scale must be finite and non-zero, got {}", self.scale),
            )
            .into());
        }
        data.iter_mut().for_each(|v| *v /= self.scale);
        Ok(data)
    }
}

/// Per-channel `(value - mean) / std` over an interleaved buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizing {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalizing {
    pub fn new(mean: impl Into<Vec<f32>>, std: impl Into<Vec<f32>>) -> Self {
        Self {
            mean: mean.into(),
            std: std.into(),
        }
    }

    fn validate(&self, channels: usize) -> Result<(), PipelineError> {
        if self.mean.len() != channels || self.std.len() != channels {
            return Err(PipelineError::invalid(
                self.name(),
                format!(
                    "expected {channels} mean/std values, got {} and {}",
                    self.mean.len(),
                    self.std.len()
                ),
            ));
        }
        if self.std.contains(&0.0) {
            return Err(PipelineError::invalid(self.name(), "std values must be non-zero"));
        }
        Ok(())
    }
}

impl TensorOperation for Normalizing {
    fn name(&self) -> &'static str {
        "normalizing"
    }

    fn apply(&self, mut data: Vec<f32>, shape: ImageShape) -> Result<Vec<f32>> {
        let channels = shape.channels as usize;
        self.validate(channels)?;
        for pixel in data.chunks_exact_mut(channels) {
            for ((value, mean), std) in pixel.iter_mut().zip(&self.mean).zip(&self.std) {
                *value = (*value - mean) / std;
            }
        }
        Ok(data)
    }
}

/// Reorder an interleaved HWC buffer into planar CHW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelsFirst;

impl TensorOperation for ChannelsFirst {
    fn name(&self) -> &'static str {
        "channels_first"
    }

    fn apply(&self, data: Vec<f32>, shape: ImageShape) -> Result<Vec<f32>> {
        let dims = (
            shape.height as usize,
            shape.width as usize,
            shape.channels as usize,
        );
        let hwc = Array3::from_shape_vec(dims, data)
            .with_context(|| format!("buffer does not match image shape {shape}"))?;
        Ok(hwc.permuted_axes([2, 0, 1]).iter().copied().collect())
    }
}

/// Input conventions of common training frameworks, applied to 0..=255 RGB values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInput {
    pub mode: InputMode,
}

impl ModelInput {
    pub const fn new(mode: InputMode) -> Self {
        Self { mode }
    }

    fn require_rgb(&self, shape: ImageShape) -> Result<(), PipelineError> {
        if shape.channels == 3 {
            Ok(())
        } else {
            Err(PipelineError::invalid(
                self.name(),
                format!(
                    "{:?} preprocessing needs 3 channels, image has {}",
                    self.mode, shape.channels
                ),
            ))
        }
    }
}

impl TensorOperation for ModelInput {
    fn name(&self) -> &'static str {
        "model_input"
    }

    fn apply(&self, data: Vec<f32>, shape: ImageShape) -> Result<Vec<f32>> {
        match self.mode {
            InputMode::Tf => Ok(data.into_iter().map(|v| v / 127.5 - 1.0).collect()),
            InputMode::Torch => {
                self.require_rgb(shape)?;
                let scaled = Rescaling::new(255.0).apply(data, shape)?;
                Normalizing::new(IMAGENET_MEAN, IMAGENET_STD).apply(scaled, shape)
            }
            InputMode::Caffe => {
                self.require_rgb(shape)?;
                let mut data = data;
                for pixel in data.chunks_exact_mut(3) {
                    pixel.swap(0, 2);
                    for (value, mean) in pixel.iter_mut().zip(CAFFE_BGR_MEAN) {
                        *value -= mean;
                    }
                }
                Ok(data)
            }
        }
    }
}

impl From<&TensorOpSettings> for Box<dyn TensorOperation> {
    fn from(settings: &TensorOpSettings) -> Self {
        match settings {
            TensorOpSettings::Rescaling { scale } => Box::new(Rescaling::new(*scale)),
            TensorOpSettings::Normalizing { mean, std } => {
                Box::new(Normalizing::new(mean.clone(), std.clone()))
            }
            TensorOpSettings::ChannelsFirst => Box::new(ChannelsFirst),
            TensorOpSettings::ModelInput { mode } => Box::new(ModelInput::new(*mode)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn rescaling_divides_values() {
        let out = Rescaling::default()
            .apply(vec![0.0, 51.0, 255.0], ImageShape::new(3, 1, 1))
            .expect("rescale");
        assert_close(&out, &[0.0, 0.2, 1.0]);
        assert!(
            Rescaling::new(0.0)
                .apply(vec![1.0], ImageShape::new(1, 1, 1))
                .is_err()
        );
    }

    #[test]
    fn normalizing_uses_per_channel_statistics() {
        let shape = ImageShape::new(2, 1, 2);
        let op = Normalizing::new([1.0, 10.0], [1.0, 2.0]);
        let out = op.apply(vec![3.0, 14.0, 1.0, 10.0], shape).expect("normalize");
        assert_close(&out, &[2.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn normalizing_rejects_channel_mismatch() {
        let op = Normalizing::new([0.5], [0.5]);
        let err = op
            .apply(vec![0.0; 6], ImageShape::new(2, 1, 3))
            .expect_err("mismatch");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidOperation {
                operation: "normalizing",
                ..
            })
        ));
    }

    #[test]
    fn channels_first_transposes_layout() {
        // 2x1 image, pixels (r0 g0 b0) (r1 g1 b1)
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = ChannelsFirst
            .apply(data, ImageShape::new(2, 1, 3))
            .expect("transpose");
        assert_eq!(out, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        assert!(
            ChannelsFirst
                .apply(vec![0.0; 5], ImageShape::new(2, 1, 3))
                .is_err()
        );
    }

    #[test]
    fn model_input_modes() {
        let shape = ImageShape::new(1, 1, 3);
        let tf = ModelInput::new(InputMode::Tf)
            .apply(vec![0.0, 127.5, 255.0], shape)
            .expect("tf");
        assert_close(&tf, &[-1.0, 0.0, 1.0]);

        let torch = ModelInput::new(InputMode::Torch)
            .apply(vec![255.0 * 0.485, 255.0 * 0.456, 255.0 * 0.406], shape)
            .expect("torch");
        assert_close(&torch, &[0.0, 0.0, 0.0]);

        let caffe = ModelInput::new(InputMode::Caffe)
            .apply(vec![123.68, 116.779, 103.939], shape)
            .expect("caffe");
        assert_close(&caffe, &[0.0, 0.0, 0.0]);

        assert!(
            ModelInput::new(InputMode::Caffe)
                .apply(vec![1.0], ImageShape::new(1, 1, 1))
                .is_err()
        );
    }
}
