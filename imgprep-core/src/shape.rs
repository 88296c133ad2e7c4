//! Image shapes as planned from configuration and as measured from pixels.

use std::fmt;

use image::DynamicImage;
use imgprep_utils::image_dimensions;

/// Width, height and channel count of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl ImageShape {
    pub const fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Measure the shape of an image from its own color model.
    pub fn of(image: &DynamicImage) -> Self {
        let (width, height, channels) = image_dimensions(image);
        Self::new(width, height, channels)
    }

    /// Number of scalar values an interleaved buffer of this shape holds.
    pub fn num_elements(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Shape while planning a pipeline, which may be unknown until a shape-fixing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlannedShape {
    #[default]
    Unknown,
    Known(ImageShape),
}

impl PlannedShape {
    pub fn known(self) -> Option<ImageShape> {
        match self {
            PlannedShape::Known(shape) => Some(shape),
            PlannedShape::Unknown => None,
        }
    }

    /// Apply `f` to a known shape; unknown stays unknown.
    pub fn map(self, f: impl FnOnce(ImageShape) -> ImageShape) -> Self {
        match self {
            PlannedShape::Known(shape) => PlannedShape::Known(f(shape)),
            PlannedShape::Unknown => PlannedShape::Unknown,
        }
    }
}

impl From<Option<ImageShape>> for PlannedShape {
    fn from(shape: Option<ImageShape>) -> Self {
        shape.map_or(PlannedShape::Unknown, PlannedShape::Known)
    }
}
