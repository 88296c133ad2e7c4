//! Sinks that persist intermediate images produced by the image stage.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use log::debug;

/// Receives a snapshot of the working image after an operation.
pub trait ImageSaver: Send + Sync + std::fmt::Debug {
    /// Persist `image` under the logical `name` of the image being processed.
    fn save(&self, name: &str, image: &DynamicImage) -> Result<()>;
}

/// Writes `<dir>/<name>.<ext>` in a fixed format, creating the directory on demand.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
    format: ImageFormat,
}

impl DirectorySaver {
    /// Save PNG files into `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self::with_format(dir, ImageFormat::Png)
    }

    pub fn with_format<P: Into<PathBuf>>(dir: P, format: ImageFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination file for an image called `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let ext = self.format.extensions_str().first().copied().unwrap_or("png");
        self.dir.join(format!("{name}.{ext}"))
    }
}

impl ImageSaver for DirectorySaver {
    fn save(&self, name: &str, image: &DynamicImage) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create save directory {}", self.dir.display()))?;
        let path = self.path_for(name);
        image
            .save_with_format(&path, self.format)
            .with_context(|| format!("failed to save intermediate image {}", path.display()))?;
        debug!("Saved intermediate image to {}", path.display());
        Ok(())
    }
}
