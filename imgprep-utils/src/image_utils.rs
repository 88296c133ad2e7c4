use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};

use crate::config::ColorMode;

/// Load an image from disk into memory.
///
/// # Arguments
///
/// * `path` - The path to the image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Convert an image into the pixel representation used by `mode`.
///
/// Grayscale becomes 8-bit luma; RGB and BGR both become 8-bit RGB since channel order
/// only matters once pixels are flattened by [`image_to_bytes`].
pub fn convert_color(image: &DynamicImage, mode: ColorMode) -> DynamicImage {
    match (mode, image) {
        (ColorMode::Grayscale, DynamicImage::ImageLuma8(_)) => image.clone(),
        (ColorMode::Grayscale, _) => DynamicImage::ImageLuma8(image.to_luma8()),
        (ColorMode::Rgb | ColorMode::Bgr, DynamicImage::ImageRgb8(_)) => image.clone(),
        (ColorMode::Rgb | ColorMode::Bgr, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Flatten an image into interleaved (HWC) bytes with the channel layout of `mode`.
pub fn image_to_bytes(image: &DynamicImage, mode: ColorMode) -> Vec<u8> {
    match mode {
        ColorMode::Grayscale => image.to_luma8().into_raw(),
        ColorMode::Rgb => image.to_rgb8().into_raw(),
        ColorMode::Bgr => {
            let mut raw = image.to_rgb8().into_raw();
            for pixel in raw.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            raw
        }
    }
}

/// Widen raw bytes into `f32` values in `0.0..=255.0`.
pub fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| f32::from(b)).collect()
}

/// Width, height and channel count of an image as stored.
pub fn image_dimensions(image: &DynamicImage) -> (u32, u32, u32) {
    let (width, height) = image.dimensions();
    (width, height, u32::from(image.color().channel_count()))
}
