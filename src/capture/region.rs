//! Selection cropping. Viewport rectangles in, PNG bytes out; no I/O.

use crate::protocol::ScreenRegion;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// A rectangle in device pixels, ready to hand to `crop_to_png_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Maps a viewport rectangle onto the device-pixel grid of a full-frame capture.
///
/// Origins are floored and sizes rounded, so a selection never starts
/// half a pixel inside the user's rectangle.
pub fn to_device_pixels(region: &ScreenRegion) -> PixelRect {
    let ratio = if region.device_pixel_ratio.is_finite() && region.device_pixel_ratio > 0.0 {
        region.device_pixel_ratio
    } else {
        1.0
    };

    let scale = |v: f64| (v * ratio).max(0.0);
    PixelRect {
        x: scale(region.left).floor() as u32,
        y: scale(region.top).floor() as u32,
        width: scale(region.width).round() as u32,
        height: scale(region.height).round() as u32,
    }
}

/// Crop to an already-scaled device rectangle and encode as PNG.
pub fn crop_to_png_bytes(image: &DynamicImage, rect: PixelRect) -> Result<Vec<u8>, CropError> {
    let cropped = crop_checked(image, rect)?;
    encode_png(&cropped)
}

/// Crops a full-frame capture to a viewport selection.
///
/// The crop is taken at device resolution and scaled back to CSS pixels,
/// so the attachment has the size the user saw on screen.
pub fn crop_viewport_region(
    image: &DynamicImage,
    region: &ScreenRegion,
) -> Result<Vec<u8>, CropError> {
    let rect = to_device_pixels(region);
    let cropped = crop_checked(image, rect)?;

    let css_width = region.width.round().max(1.0) as u32;
    let css_height = region.height.round().max(1.0) as u32;

    let output = if (css_width, css_height) == (rect.width, rect.height) {
        cropped
    } else {
        cropped.resize_exact(css_width, css_height, FilterType::Triangle)
    };

    encode_png(&output)
}

fn crop_checked(image: &DynamicImage, rect: PixelRect) -> Result<DynamicImage, CropError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = (image.width(), image.height());

    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    let inside = matches!((right, bottom), (Some(r), Some(b)) if r <= img_width && b <= img_height);
    if !inside {
        return Err(CropError::OutOfBounds {
            requested: (rect.x, rect.y, rect.width, rect.height),
            image_size: (img_width, img_height),
        });
    }

    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Encodes a whole frame as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CropError> {
    let mut png_bytes: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;
    Ok(png_bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Selection is empty")]
    ZeroDimension,

    #[error(
        "Selection ({},{} {}x{}) falls outside the {}x{} frame",
        requested.0, requested.1, requested.2, requested.3,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: (u32, u32, u32, u32),
        image_size: (u32, u32),
    },

    #[error("Captured frame could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("Could not encode PNG: {0}")]
    EncodingFailed(String),
}
