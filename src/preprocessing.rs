// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for inference.
//!
//! The letterbox transform fits an arbitrary image into a square canvas with a
//! uniform scale factor, centring it and filling the remainder with a fixed gray.
//! The returned [`LetterboxParams`] is the only information needed to map canvas
//! coordinates back to the original image (see [`crate::remap`]).

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

use crate::error::{InferenceError, Result};

/// Letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Reciprocal of 255 for normalization.
const INV_255: f32 = 1.0 / 255.0;

/// Geometry of one letterbox transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    /// Uniform scale, `target_size / max(orig_width, orig_height)`.
    pub scale: f32,
    /// Columns of padding left of the resized image.
    pub pad_left: u32,
    /// Rows of padding above the resized image.
    pub pad_top: u32,
    /// Width of the resized image inside the canvas.
    pub new_width: u32,
    /// Height of the resized image inside the canvas.
    pub new_height: u32,
    /// Source image width.
    pub orig_width: u32,
    /// Source image height.
    pub orig_height: u32,
    /// Canvas side length.
    pub target_size: u32,
}

impl LetterboxParams {
    /// Compute scale, resized dimensions and centring offsets.
    ///
    /// # Arguments
    ///
    /// * `orig_width` - Source image width.
    /// * `orig_height` - Source image height.
    /// * `target_size` - Side of the square canvas.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidInput`] when any dimension is zero.
    pub fn compute(orig_width: u32, orig_height: u32, target_size: u32) -> Result<Self> {
        if orig_width == 0 || orig_height == 0 {
            return Err(InferenceError::InvalidInput(format!(
                "image has a zero dimension ({orig_width}x{orig_height})"
            )));
        }
        if target_size == 0 {
            return Err(InferenceError::InvalidInput(
                "target size must be positive".to_string(),
            ));
        }

        let scale = f64::from(target_size) / f64::from(orig_width.max(orig_height));

        // At least one pixel survives along each axis, and never more than the canvas.
        let new_width = ((f64::from(orig_width) * scale).round() as u32).clamp(1, target_size);
        let new_height = ((f64::from(orig_height) * scale).round() as u32).clamp(1, target_size);

        let pad_w = target_size - new_width;
        let pad_h = target_size - new_height;

        Ok(Self {
            scale: scale as f32,
            pad_left: pad_w / 2,
            pad_top: pad_h / 2,
            new_width,
            new_height,
            orig_width,
            orig_height,
            target_size,
        })
    }

    /// Columns of padding right of the resized image.
    #[must_use]
    pub const fn pad_right(&self) -> u32 {
        self.target_size - self.new_width - self.pad_left
    }

    /// Rows of padding below the resized image.
    #[must_use]
    pub const fn pad_bottom(&self) -> u32 {
        self.target_size - self.new_height - self.pad_top
    }
}

/// A letterboxed canvas and the transform that produced it.
#[derive(Debug, Clone)]
pub struct Letterboxed {
    /// Square RGB canvas of side `params.target_size`.
    pub canvas: RgbImage,
    /// Transform parameters.
    pub params: LetterboxParams,
}

impl Letterboxed {
    /// Normalized NCHW tensor of the canvas, shape `(1, 3, S, S)`.
    #[must_use]
    pub fn to_tensor(&self) -> Array4<f32> {
        image_to_tensor(&self.canvas)
    }
}

/// Letterbox an image into a square canvas of side `target_size`.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidInput`] for zero-sized images or canvas, and
/// [`InferenceError::Image`] if resizing fails.
pub fn letterbox(image: &DynamicImage, target_size: u32) -> Result<Letterboxed> {
    let params = LetterboxParams::compute(image.width(), image.height(), target_size)?;
    let resized = resize_rgb(&image.to_rgb8(), params.new_width, params.new_height)?;

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb(LETTERBOX_COLOR));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(params.pad_left),
        i64::from(params.pad_top),
    );

    Ok(Letterboxed { canvas, params })
}

/// Bilinear resize of an RGB image.
fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }

    let (src_w, src_h) = src.dimensions();
    let src_image = Image::from_vec_u8(src_w, src_h, src.as_raw().clone(), PixelType::U8x3)
        .map_err(|e| InferenceError::Image(format!("Failed to wrap source image: {e}")))?;
    let mut dst_image = Image::new(width, height, PixelType::U8x3);

    let options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| InferenceError::Image(format!("Failed to resize image: {e}")))?;

    RgbImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| InferenceError::Image("Resized buffer has wrong length".to_string()))
}

/// Convert an RGB image to a normalized NCHW tensor.
///
/// Returns an array with shape (1, 3, H, W) and values in [0, 1].
#[must_use]
pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let plane = h * w;

    let mut data = vec![0.0f32; 3 * plane];
    for (i, chunk) in image.as_raw().chunks_exact(3).enumerate() {
        data[i] = f32::from(chunk[0]) * INV_255;
        data[plane + i] = f32::from(chunk[1]) * INV_255;
        data[2 * plane + i] = f32::from(chunk[2]) * INV_255;
    }

    Array4::from_shape_vec((1, 3, h, w), data).unwrap_or_else(|_| Array4::zeros((1, 3, h, w)))
}
