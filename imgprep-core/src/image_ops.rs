//! Operations applied to decoded images before they are flattened into a buffer.
//!
//! Every operation can transform pixels ([`ImageOperation::apply`]) and predict its output
//! shape without touching pixels ([`ImageOperation::output_shape`]). Operations that keep
//! the image size leave an unknown input shape unknown.

use std::fmt;

use anyhow::Result;
use image::{DynamicImage, GenericImageView, ImageBuffer, Luma, Pixel, Rgb, Rgba, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imgprep_utils::{ColorMode, ImageOpSettings, ResizeFilter, convert_color};

use crate::{
    error::PipelineError,
    shape::{ImageShape, PlannedShape},
};

/// A single image-stage transformation.
pub trait ImageOperation: Send + Sync + fmt::Debug {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Transform the working image.
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage>;

    /// Shape after this operation given the planned input shape.
    ///
    /// `color_mode` is the planned color mode at this point of the stage; operations that
    /// fix the size use it for the channel count when the input is unknown.
    fn output_shape(&self, input: PlannedShape, color_mode: ColorMode) -> PlannedShape;

    /// Planned color mode after this operation.
    fn output_color_mode(&self, input: ColorMode) -> ColorMode {
        input
    }
}

/// Resize to a fixed size, ignoring aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
    pub filter: ResizeFilter,
}

impl Resize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: ResizeFilter::Quality,
        }
    }

    pub const fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl ImageOperation for Resize {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::invalid(
                self.name(),
                format!("target size {}x{} must be non-zero", self.width, self.height),
            )
            .into());
        }
        if image.dimensions() == (self.width, self.height) {
            return Ok(image);
        }
        Ok(image.resize_exact(self.width, self.height, self.filter.filter_type()))
    }

    fn output_shape(&self, input: PlannedShape, color_mode: ColorMode) -> PlannedShape {
        let channels = input
            .known()
            .map_or(color_mode.channels(), |shape| shape.channels);
        PlannedShape::Known(ImageShape::new(self.width, self.height, channels))
    }
}

/// Remove the given number of pixels from each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crop {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Crop {
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }
}

impl ImageOperation for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        let (width, height) = image.dimensions();
        let horizontal = self.left.saturating_add(self.right);
        let vertical = self.top.saturating_add(self.bottom);
        if horizontal >= width || vertical >= height {
            return Err(PipelineError::invalid(
                self.name(),
                format!(
                    "cropping {horizontal}px horizontally and {vertical}px vertically leaves nothing of a {width}x{height} image"
                ),
            )
            .into());
        }
        Ok(image.crop_imm(self.left, self.top, width - horizontal, height - vertical))
    }

    fn output_shape(&self, input: PlannedShape, _color_mode: ColorMode) -> PlannedShape {
        input.map(|shape| {
            ImageShape::new(
                shape.width.saturating_sub(self.left.saturating_add(self.right)),
                shape.height.saturating_sub(self.top.saturating_add(self.bottom)),
                shape.channels,
            )
        })
    }
}

/// Surround the image with a constant border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pad {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    /// Intensity written to every color channel of the border.
    pub fill: u8,
}

impl Pad {
    pub const fn uniform(border: u32, fill: u8) -> Self {
        Self {
            top: border,
            bottom: border,
            left: border,
            right: border,
            fill,
        }
    }

    /// Canvas size around a `width`x`height` image, `None` when it does not fit in `u32`.
    fn padded_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let width = width.checked_add(self.left)?.checked_add(self.right)?;
        let height = height.checked_add(self.top)?.checked_add(self.bottom)?;
        Some((width, height))
    }
}

fn padded<P>(
    source: &ImageBuffer<P, Vec<u8>>,
    (width, height): (u32, u32),
    (left, top): (u32, u32),
    fill: P,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut canvas = ImageBuffer::from_pixel(width, height, fill);
    imageops::replace(&mut canvas, source, i64::from(left), i64::from(top));
    canvas
}

impl ImageOperation for Pad {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        let (width, height) = image.dimensions();
        let size = self.padded_size(width, height).ok_or_else(|| {
            PipelineError::invalid(
                self.name(),
                format!("padding a {width}x{height} image exceeds the maximum image size"),
            )
        })?;
        let offset = (self.left, self.top);
        let v = self.fill;
        Ok(match image {
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(padded(&gray, size, offset, Luma([v])))
            }
            DynamicImage::ImageRgba8(rgba) => DynamicImage::ImageRgba8(padded(
                &rgba,
                size,
                offset,
                Rgba([v, v, v, u8::MAX]),
            )),
            other => {
                DynamicImage::ImageRgb8(padded(&other.to_rgb8(), size, offset, Rgb([v, v, v])))
            }
        })
    }

    fn output_shape(&self, input: PlannedShape, _color_mode: ColorMode) -> PlannedShape {
        input.map(|shape| {
            ImageShape::new(
                shape.width.saturating_add(self.left).saturating_add(self.right),
                shape.height.saturating_add(self.top).saturating_add(self.bottom),
                shape.channels,
            )
        })
    }
}

/// Rotate clockwise about the image center, keeping the canvas size.
///
/// Corners uncovered by the rotation are filled with black.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    pub degrees: f32,
}

impl Rotate {
    pub const fn new(degrees: f32) -> Self {
        Self { degrees }
    }
}

impl ImageOperation for Rotate {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        if !self.degrees.is_finite() {
            return Err(PipelineError::invalid(
                self.name(),
                format!("angle must be finite, got {}", self.degrees),
            )
            .into());
        }
        if self.degrees % 360.0 == 0.0 {
            return Ok(image);
        }
        let theta = self.degrees.to_radians();
        let interpolation = Interpolation::Bilinear;
        Ok(match image {
            DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
                &gray,
                theta,
                interpolation,
                Luma([0]),
            )),
            DynamicImage::ImageRgba8(rgba) => DynamicImage::ImageRgba8(rotate_about_center(
                &rgba,
                theta,
                interpolation,
                Rgba([0, 0, 0, 0]),
            )),
            other => DynamicImage::ImageRgb8(rotate_about_center(
                &other.to_rgb8(),
                theta,
                interpolation,
                Rgb([0, 0, 0]),
            )),
        })
    }

    fn output_shape(&self, input: PlannedShape, _color_mode: ColorMode) -> PlannedShape {
        input
    }
}

/// Convert the working image to another color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convert {
    pub color_mode: ColorMode,
}

impl Convert {
    pub const fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }
}

impl ImageOperation for Convert {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage> {
        Ok(convert_color(&image, self.color_mode))
    }

    fn output_shape(&self, input: PlannedShape, _color_mode: ColorMode) -> PlannedShape {
        input.map(|shape| ImageShape::new(shape.width, shape.height, self.color_mode.channels()))
    }

    fn output_color_mode(&self, _input: ColorMode) -> ColorMode {
        self.color_mode
    }
}

impl From<&ImageOpSettings> for Box<dyn ImageOperation> {
    fn from(settings: &ImageOpSettings) -> Self {
        match *settings {
            ImageOpSettings::Resize {
                width,
                height,
                filter,
                ..
            } => Box::new(Resize::new(width, height).with_filter(filter)),
            ImageOpSettings::Crop {
                top,
                bottom,
                left,
                right,
                ..
            } => Box::new(Crop::new(top, bottom, left, right)),
            ImageOpSettings::Pad {
                top,
                bottom,
                left,
                right,
                fill,
                ..
            } => Box::new(Pad {
                top,
                bottom,
                left,
                right,
                fill,
            }),
            ImageOpSettings::Rotate { degrees, .. } => Box::new(Rotate::new(degrees)),
            ImageOpSettings::Convert { color_mode, .. } => Box::new(Convert::new(color_mode)),
        }
    }
}
