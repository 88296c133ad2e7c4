//! Core imgprep primitives.
//!
//! This crate runs staged image preprocessing (image operations, flattening, tensor
//! operations), plans output shapes ahead of time, and classifies the result with an ONNX
//! model through `tract-onnx`.

/// Pipeline configuration errors.
pub mod error;
/// Image-stage operations (resize, crop, pad, rotate, convert).
pub mod image_ops;
/// Classification over preprocessed buffers.
pub mod inference;
/// Loader configuration.
pub mod loading;
/// ONNX model loading and execution.
pub mod model;
/// The staged pipeline runner.
pub mod pipeline;
/// Sinks for intermediate images.
pub mod save;
/// Planned and measured image shapes.
pub mod shape;
/// Tensor-stage operations (rescaling, normalization, layout).
pub mod tensor_ops;

pub use error::PipelineError;
pub use image_ops::{Convert, Crop, ImageOperation, Pad, Resize, Rotate};
pub use inference::{Classification, Classifier, Prediction, input_dims, softmax, top_k};
pub use loading::Loading;
pub use model::OnnxModel;
pub use pipeline::{
    ImageStage, ImageStep, PreprocessOutput, Preprocessing, TensorStage, step_save_dir,
};
pub use save::{DirectorySaver, ImageSaver};
pub use shape::{ImageShape, PlannedShape};
pub use tensor_ops::{ChannelsFirst, ModelInput, Normalizing, Rescaling, TensorOperation};
