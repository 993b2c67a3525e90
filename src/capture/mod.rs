//! Screen capture domain: public API.
//!
//! This module owns the capture engine: grabbing the visible surface,
//! tracking the user's selection, cropping at device resolution and the
//! placeholder used when any of that fails.
//! External code should only use the items exported here.

mod data_url;
mod placeholder;
mod region;
mod screenshot;
mod selection;

pub use data_url::{data_url, decode_data_url, png_data_url, DataUrl, DataUrlError};
pub use placeholder::{placeholder_image, placeholder_png};
pub use region::{crop_to_png_bytes, crop_viewport_region, encode_png, to_device_pixels, CropError, PixelRect};
pub use screenshot::{capture_primary_monitor, CaptureError, FrameSurface, PrimaryMonitor, VisibleSurface};
pub use selection::{Selection, SelectionTracker, MIN_SELECTION_PX};

use crate::protocol::ScreenRegion;

/// Decodes a full-frame data URL and crops it to the viewport selection.
///
/// This is the replica-side half of the capture handshake; the CPU-heavy
/// part runs on the blocking pool.
pub async fn crop_data_url(frame_url: String, region: ScreenRegion) -> Result<Vec<u8>, CropError> {
    tokio::task::spawn_blocking(move || {
        let frame = decode_data_url(&frame_url).map_err(|e| CropError::DecodeFailed(e.to_string()))?;
        let image = image::load_from_memory(&frame.bytes)
            .map_err(|e| CropError::DecodeFailed(e.to_string()))?;
        crop_viewport_region(&image, &region)
    })
    .await
    .map_err(|e| CropError::DecodeFailed(format!("crop task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn frame_url(width: u32, height: u32) -> String {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        png_data_url(&crop_to_png_bytes(&img, PixelRect { x: 0, y: 0, width, height }).unwrap())
    }

    #[tokio::test]
    async fn crops_frame_from_data_url() {
        let region = ScreenRegion {
            left: 10.0,
            top: 10.0,
            width: 20.0,
            height: 15.0,
            device_pixel_ratio: 1.0,
        };
        let png = crop_data_url(frame_url(64, 64), region).await.unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 15));
    }

    #[tokio::test]
    async fn garbage_frame_is_a_decode_failure() {
        let region = ScreenRegion {
            left: 0.0,
            top: 0.0,
            width: 20.0,
            height: 20.0,
            device_pixel_ratio: 1.0,
        };
        let err = crop_data_url("data:image/png;base64,AAAA".to_string(), region)
            .await
            .unwrap_err();
        assert!(matches!(err, CropError::DecodeFailed(_)));
    }
}
