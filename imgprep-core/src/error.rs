use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors raised by the pipeline itself.
///
/// Failures from decoding, disk access or the model runtime are not represented here;
/// they travel as `anyhow::Error` and can be told apart with
/// `err.downcast_ref::<PipelineError>()`.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error(
        "final image shape is indeterminate: add a shape-fixing operation (e.g. a fixed-size resize) \
         or declare the image shape on the loader"
    )]
    ShapeIndeterminate,
    #[error(
        "single-image run requires the loader to target a file, but {} is a directory",
        path.display()
    )]
    InvalidTarget { path: PathBuf },
    #[error("invalid {operation} operation: {reason}")]
    InvalidOperation {
        operation: &'static str,
        reason: String,
    },
}

impl PipelineError {
    pub(crate) fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidOperation {
            operation,
            reason: reason.into(),
        }
    }
}
