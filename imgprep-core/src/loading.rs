//! Describes where pipeline input comes from and how it is decoded.

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::DynamicImage;
use imgprep_utils::{ColorMode, LoadSettings, convert_color, load_image};

use crate::shape::ImageShape;

/// Loader configuration: a file or directory, the buffer color mode and an optional
/// declared shape used for planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loading {
    path_to_data: PathBuf,
    color_mode: ColorMode,
    image_shape: Option<ImageShape>,
}

impl Loading {
    pub fn new<P: Into<PathBuf>>(path_to_data: P, color_mode: ColorMode) -> Self {
        Self {
            path_to_data: path_to_data.into(),
            color_mode,
            image_shape: None,
        }
    }

    /// Declare the nominal image size; the channel count follows the color mode.
    pub fn with_declared_size(mut self, width: u32, height: u32) -> Self {
        self.image_shape = Some(ImageShape::new(width, height, self.color_mode.channels()));
        self
    }

    pub fn path_to_data(&self) -> &Path {
        &self.path_to_data
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn image_shape(&self) -> Option<ImageShape> {
        self.image_shape
    }

    /// Whether the configured target is a directory rather than a single image.
    pub fn targets_directory(&self) -> bool {
        self.path_to_data.is_dir()
    }

    /// Decode `file` and bring it into this loader's color mode.
    pub fn file_to_image(&self, file: &Path) -> Result<DynamicImage> {
        let image = load_image(file)?;
        Ok(convert_color(&image, self.color_mode))
    }
}

impl From<&LoadSettings> for Loading {
    fn from(settings: &LoadSettings) -> Self {
        let loading = Loading::new(settings.path.clone(), settings.color_mode);
        match settings.declared_size() {
            Some((width, height)) => loading.with_declared_size(width, height),
            None => loading,
        }
    }
}
