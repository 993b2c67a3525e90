//! The host's "capture visible surface" primitive.
//!
//! `PrimaryMonitor` is the infrastructure implementation; it talks to the
//! OS through `xcap`. `FrameSurface` serves a frame somebody else already
//! grabbed (the browser's own tab capture, or a test fixture).

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::{Mutex, PoisonError};
use xcap::Monitor;

/// Produces a full-frame image of whatever is currently visible.
#[async_trait]
pub trait VisibleSurface: Send + Sync {
    async fn capture_visible(&self) -> Result<DynamicImage, CaptureError>;
}

/// Grab the desktop the browser window sits on, uncropped. Cropping to the
/// selection happens in `region`, once the device pixel ratio is known.
pub fn capture_primary_monitor() -> Result<DynamicImage, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;

    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary().unwrap_or(false) {
            return grab(&monitor);
        }
        if fallback.is_none() {
            fallback = Some(monitor);
        }
    }

    // No monitor reports as primary: use the first one
    let monitor = fallback.ok_or(CaptureError::NoPrimaryMonitor)?;
    grab(&monitor)
}

fn grab(monitor: &Monitor) -> Result<DynamicImage, CaptureError> {
    let image = monitor
        .capture_image()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(CaptureError::NoData);
    }
    Ok(DynamicImage::ImageRgba8(image))
}

/// Primary-monitor capture, run off the async executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimaryMonitor;

#[async_trait]
impl VisibleSurface for PrimaryMonitor {
    async fn capture_visible(&self) -> Result<DynamicImage, CaptureError> {
        let start = std::time::Instant::now();
        let image = tokio::task::spawn_blocking(capture_primary_monitor)
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("capture task failed: {}", e)))??;
        log::info!(
            "[CAPTURE] Screen captured in {}ms ({}x{})",
            start.elapsed().as_millis(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Thread-safe holder for a frame captured elsewhere.
/// Serves a copy on every capture until replaced or cleared.
#[derive(Default)]
pub struct FrameSurface {
    frame: Mutex<Option<DynamicImage>>,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: DynamicImage) -> Self {
        Self {
            frame: Mutex::new(Some(frame)),
        }
    }

    pub fn set_frame(&self, frame: DynamicImage) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    pub fn clear(&self) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl VisibleSurface for FrameSurface {
    async fn capture_visible(&self) -> Result<DynamicImage, CaptureError> {
        let guard = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(frame) if frame.width() > 0 && frame.height() > 0 => Ok(frame.clone()),
            _ => Err(CaptureError::NoData),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Could not list displays: {0}")]
    MonitorEnumeration(String),

    #[error("No display to capture")]
    NoPrimaryMonitor,

    #[error("Visible surface capture failed: {0}")]
    CaptureFailed(String),

    #[error("No screenshot data returned")]
    NoData,
}
