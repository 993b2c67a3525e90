//! Host page primitives the replica needs: the overlay element, the page's
//! own layout styles, and the postMessage channel into the overlay.

use crate::protocol::OverlayMessage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The page styles the replica shifts to make room for the overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutSnapshot {
    pub margin_right: String,
    pub width: String,
    pub max_width: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayHandle(pub u64);

/// What a tab's document offers to its replica.
pub trait PageHost: Send {
    fn read_layout(&self) -> LayoutSnapshot;
    fn write_layout(&mut self, layout: &LayoutSnapshot);

    fn mount_overlay(&mut self, width: u32) -> OverlayHandle;
    fn remove_overlay(&mut self, handle: OverlayHandle);
    fn set_overlay_visible(&mut self, handle: OverlayHandle, visible: bool);
    fn post_to_overlay(&mut self, handle: OverlayHandle, message: OverlayMessage);

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedOverlay {
    pub width: u32,
    pub visible: bool,
}

/// Observable state of a `MemoryPage`.
#[derive(Debug, Clone)]
pub struct PageState {
    pub layout: LayoutSnapshot,
    pub overlays: BTreeMap<OverlayHandle, MountedOverlay>,
    pub posted: Vec<(OverlayHandle, OverlayMessage)>,
    pub mounts: usize,
    pub layout_writes: usize,
    pub device_pixel_ratio: f64,
    next_handle: u64,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            layout: LayoutSnapshot::default(),
            overlays: BTreeMap::new(),
            posted: Vec::new(),
            mounts: 0,
            layout_writes: 0,
            device_pixel_ratio: 1.0,
            next_handle: 1,
        }
    }
}

impl PageState {
    /// The single mounted overlay, if any.
    pub fn overlay(&self) -> Option<&MountedOverlay> {
        self.overlays.values().next()
    }

    pub fn messages(&self) -> impl Iterator<Item = &OverlayMessage> {
        self.posted.iter().map(|(_, m)| m)
    }
}

/// In-memory document. Clones share state, so a test (or a headless host)
/// can keep one clone to observe what the replica does with the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    state: Arc<Mutex<PageState>>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: LayoutSnapshot) -> Self {
        let page = Self::new();
        page.lock().layout = layout;
        page
    }

    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        self.lock().device_pixel_ratio = ratio;
    }

    pub fn snapshot(&self) -> PageState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PageHost for MemoryPage {
    fn read_layout(&self) -> LayoutSnapshot {
        self.lock().layout.clone()
    }

    fn write_layout(&mut self, layout: &LayoutSnapshot) {
        let mut state = self.lock();
        state.layout = layout.clone();
        state.layout_writes += 1;
    }

    fn mount_overlay(&mut self, width: u32) -> OverlayHandle {
        let mut state = self.lock();
        let handle = OverlayHandle(state.next_handle);
        state.next_handle += 1;
        state.mounts += 1;
        state.overlays.insert(
            handle,
            MountedOverlay {
                width,
                visible: true,
            },
        );
        handle
    }

    fn remove_overlay(&mut self, handle: OverlayHandle) {
        self.lock().overlays.remove(&handle);
    }

    fn set_overlay_visible(&mut self, handle: OverlayHandle, visible: bool) {
        if let Some(overlay) = self.lock().overlays.get_mut(&handle) {
            overlay.visible = visible;
        }
    }

    fn post_to_overlay(&mut self, handle: OverlayHandle, message: OverlayMessage) {
        let mut state = self.lock();
        if state.overlays.contains_key(&handle) {
            state.posted.push((handle, message));
        }
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.lock().device_pixel_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let page = MemoryPage::new();
        let mut writer = page.clone();
        let handle = writer.mount_overlay(400);
        writer.post_to_overlay(handle, OverlayMessage::RefreshChatHistory);

        let seen = page.snapshot();
        assert_eq!(seen.mounts, 1);
        assert_eq!(seen.overlay().map(|o| o.width), Some(400));
        assert_eq!(seen.posted.len(), 1);
    }

    #[test]
    fn posts_to_removed_overlay_are_dropped() {
        let mut page = MemoryPage::new();
        let handle = page.mount_overlay(400);
        page.remove_overlay(handle);
        page.post_to_overlay(handle, OverlayMessage::RefreshChatHistory);
        assert!(page.snapshot().posted.is_empty());
    }

    #[test]
    fn default_ratio_is_one() {
        assert_eq!(MemoryPage::new().device_pixel_ratio(), 1.0);
    }
}
