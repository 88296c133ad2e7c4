//! Shared configuration types consumed across the imgprep workspace.
//!
//! A pipeline is described declaratively here (loader, image operations, tensor operations,
//! optional model) so that it can be persisted as JSON and rebuilt by `imgprep-core`.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// How pixel channels are laid out in the flat numeric buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Three interleaved channels in red, green, blue order.
    #[default]
    Rgb,
    /// Three interleaved channels in blue, green, red order.
    Bgr,
    /// A single luminance channel.
    Grayscale,
}

impl ColorMode {
    /// Number of channels each pixel occupies in this mode.
    pub const fn channels(self) -> u32 {
        match self {
            ColorMode::Rgb | ColorMode::Bgr => 3,
            ColorMode::Grayscale => 1,
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorMode::Rgb => "rgb",
            ColorMode::Bgr => "bgr",
            ColorMode::Grayscale => "grayscale",
        })
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ColorMode::Rgb),
            "bgr" => Ok(ColorMode::Bgr),
            "grayscale" | "gray" | "grey" => Ok(ColorMode::Grayscale),
            other => Err(format!(
                "invalid color mode '{other}'; expected 'rgb', 'bgr' or 'grayscale'"
            )),
        }
    }
}

/// Resampling preference for resize operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Smooth bilinear resampling (Triangle filter).
    #[default]
    Quality,
    /// Nearest-neighbour resampling.
    Speed,
}

impl ResizeFilter {
    /// Map the preference onto the `image` crate filter.
    pub fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Quality => FilterType::Triangle,
            ResizeFilter::Speed => FilterType::Nearest,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeFilter::Quality),
            "speed" => Ok(ResizeFilter::Speed),
            other => Err(format!(
                "invalid resize filter '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Where the pipeline reads its images from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoadSettings {
    /// Image file or directory of images.
    pub path: PathBuf,
    /// Channel layout of the produced buffer.
    pub color_mode: ColorMode,
    /// Declared width; only used when `height` is also set.
    pub width: Option<u32>,
    /// Declared height; only used when `width` is also set.
    pub height: Option<u32>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("images"),
            color_mode: ColorMode::Rgb,
            width: None,
            height: None,
        }
    }
}

impl LoadSettings {
    /// Declared `(width, height)` when both dimensions are configured.
    pub fn declared_size(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

/// Declarative image-stage operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ImageOpSettings {
    Resize {
        width: u32,
        height: u32,
        #[serde(default)]
        filter: ResizeFilter,
        #[serde(default)]
        save: bool,
    },
    Crop {
        #[serde(default)]
        top: u32,
        #[serde(default)]
        bottom: u32,
        #[serde(default)]
        left: u32,
        #[serde(default)]
        right: u32,
        #[serde(default)]
        save: bool,
    },
    Pad {
        #[serde(default)]
        top: u32,
        #[serde(default)]
        bottom: u32,
        #[serde(default)]
        left: u32,
        #[serde(default)]
        right: u32,
        /// Fill intensity applied to every channel.
        #[serde(default)]
        fill: u8,
        #[serde(default)]
        save: bool,
    },
    Rotate {
        degrees: f32,
        #[serde(default)]
        save: bool,
    },
    Convert {
        color_mode: ColorMode,
        #[serde(default)]
        save: bool,
    },
}

impl ImageOpSettings {
    /// Whether the intermediate image should be persisted after this operation.
    pub fn wants_save(&self) -> bool {
        match self {
            ImageOpSettings::Resize { save, .. }
            | ImageOpSettings::Crop { save, .. }
            | ImageOpSettings::Pad { save, .. }
            | ImageOpSettings::Rotate { save, .. }
            | ImageOpSettings::Convert { save, .. } => *save,
        }
    }
}

/// Framework-specific input conventions for pretrained models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Scale into `[-1, 1]`.
    Tf,
    /// Scale into `[0, 1]` then normalise with ImageNet mean/std.
    Torch,
    /// Swap RGB to BGR and subtract the ImageNet BGR means.
    Caffe,
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tf" | "tensorflow" => Ok(InputMode::Tf),
            "torch" | "pytorch" => Ok(InputMode::Torch),
            "caffe" => Ok(InputMode::Caffe),
            other => Err(format!(
                "invalid input mode '{other}'; expected 'tf', 'torch' or 'caffe'"
            )),
        }
    }
}

/// Declarative tensor-stage operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TensorOpSettings {
    Rescaling { scale: f32 },
    Normalizing { mean: Vec<f32>, std: Vec<f32> },
    ChannelsFirst,
    ModelInput { mode: InputMode },
}

/// Complete declarative description of a preprocessing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineSettings {
    pub load: LoadSettings,
    pub image_ops: Vec<ImageOpSettings>,
    pub tensor_ops: Vec<TensorOpSettings>,
    /// Directory receiving intermediate images for operations flagged with `save`.
    pub save_dir: Option<PathBuf>,
}

/// Memory layout of the model input tensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, height, width, channels]`.
    #[default]
    Nhwc,
    /// `[1, channels, height, width]`.
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!(
                "invalid tensor layout '{other}'; expected 'nhwc' or 'nchw'"
            )),
        }
    }
}

/// ONNX model used to classify preprocessed images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub layout: TensorLayout,
    /// Number of predictions to report.
    pub top_k: usize,
    /// Apply softmax to the raw model output before ranking.
    pub softmax: bool,
    /// Optional class labels indexed by output position.
    pub labels: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/model.onnx"),
            layout: TensorLayout::Nhwc,
            top_k: 5,
            softmax: true,
            labels: Vec::new(),
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Persistent settings consumed by the command-line front end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppSettings {
    pub pipeline: PipelineSettings,
    /// Classification model; preprocessing only when absent.
    pub model: Option<ModelSettings>,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))
    }

    /// Serialize settings to disk as pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))
    }
}
