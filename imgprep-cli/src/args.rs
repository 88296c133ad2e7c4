//! Command-line argument definitions for imgprep-cli.

use clap::{ArgAction, Parser};
use imgprep_utils::{ColorMode, TensorLayout};
use std::path::PathBuf;

/// Run an image preprocessing pipeline over an image or a directory of images,
/// optionally classifying the result with an ONNX model.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct RunArgs {
    /// Pipeline settings JSON (defaults to an empty pipeline).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image file or directory; overrides the loader path from the settings.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Buffer color mode: rgb, bgr or grayscale.
    #[arg(long, value_name = "MODE")]
    pub color_mode: Option<ColorMode>,

    /// Declared image width used for shape planning.
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Declared image height used for shape planning.
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Directory receiving intermediate images for operations flagged with `save`.
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// ONNX model used to classify the preprocessed buffer.
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Model input layout: nhwc or nchw.
    #[arg(long, value_name = "LAYOUT")]
    pub layout: Option<TensorLayout>,

    /// Number of predictions to report per image.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Write the report to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}
