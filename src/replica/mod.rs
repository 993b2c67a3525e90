//! Per-tab replica of the sidebar state.
//!
//! A `Replica` owns the overlay in one tab and reconciles it against the
//! coordinator's broadcasts and the user's local actions. Every transition
//! is idempotent: a redundant open never mounts a second overlay and never
//! shifts the page twice, and only an explicit manual close tears down an
//! overlay that is already showing.

mod actor;
mod layout;
mod page;

pub use actor::{run_replica, spawn_replica, ReplicaEvent, ReplicaHandle};
pub use layout::LayoutGuard;
pub use page::{LayoutSnapshot, MemoryPage, MountedOverlay, OverlayHandle, PageHost, PageState};

use crate::capture::{crop_data_url, placeholder_png, png_data_url, Selection, SelectionTracker};
use crate::protocol::{
    decode_command, CoordinatorLink, CoordinatorRequest, CoordinatorResponse, GlobalSidebarState,
    OverlayEvent, OverlayMessage, ProtocolError, Region, ReplicaCommand, ReplicaResponse,
    ScreenRegion, TabId, DEFAULT_SIDEBAR_WIDTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaPhase {
    NoOverlay,
    OverlayVisible,
    HiddenForCapture,
}

/// Point-in-time view of a replica, for hosts and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaStatus {
    pub tab: TabId,
    pub phase: ReplicaPhase,
    pub cached_state: Option<GlobalSidebarState>,
    pub width: u32,
    pub layout_adjusted: bool,
    pub listening: bool,
    pub capturing: bool,
    /// The rectangle being dragged or the one sent for capture.
    pub selection: Option<Region>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// No capture session was live.
    Ignored,
    /// Selection below the minimum or explicitly abandoned.
    Cancelled,
    /// An image went to the overlay; `placeholder` marks the fallback path.
    Delivered { image_data: String, placeholder: bool },
}

#[derive(Debug, Default)]
struct CaptureSession {
    tracker: SelectionTracker,
    region: Option<Region>,
}

pub struct Replica<P, L> {
    page: P,
    link: L,
    overlay: Option<OverlayHandle>,
    overlay_hidden: bool,
    layout: LayoutGuard,
    listening: bool,
    cached: Option<GlobalSidebarState>,
    width: u32,
    capture: Option<CaptureSession>,
}

impl<P: PageHost, L: CoordinatorLink> Replica<P, L> {
    pub fn new(page: P, link: L) -> Self {
        Self {
            page,
            link,
            overlay: None,
            overlay_hidden: false,
            layout: LayoutGuard::new(),
            listening: false,
            cached: None,
            width: DEFAULT_SIDEBAR_WIDTH,
            capture: None,
        }
    }

    pub fn tab(&self) -> TabId {
        self.link.tab()
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn phase(&self) -> ReplicaPhase {
        match (self.overlay, self.overlay_hidden) {
            (None, _) => ReplicaPhase::NoOverlay,
            (Some(_), false) => ReplicaPhase::OverlayVisible,
            (Some(_), true) => ReplicaPhase::HiddenForCapture,
        }
    }

    pub fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            tab: self.tab(),
            phase: self.phase(),
            cached_state: self.cached,
            width: self.width,
            layout_adjusted: self.layout.is_adjusted(),
            listening: self.listening,
            capturing: self.capture.is_some(),
            selection: self
                .capture
                .as_ref()
                .and_then(|session| session.region.or_else(|| session.tracker.current())),
        }
    }

    /// Announce this replica to the coordinator and adopt the state it
    /// returns. Called once, when the replica starts.
    pub async fn announce_ready(&mut self) {
        match self.link.request(CoordinatorRequest::ContentScriptReady).await {
            Ok(CoordinatorResponse::Ready { sidebar_state }) => {
                log::info!(
                    "[REPLICA] Tab {} ready, sidebar open={} width={}",
                    self.tab(),
                    sidebar_state.is_open,
                    sidebar_state.width
                );
                self.remember(sidebar_state);
                if sidebar_state.is_open {
                    self.show_overlay();
                }
            }
            Ok(other) => log::warn!("[REPLICA] Unexpected ready response: {:?}", other),
            Err(e) => log::warn!("[REPLICA] Could not reach coordinator on load: {}", e),
        }
    }

    /// Apply a coordinator (or popup) command.
    pub fn handle_command(&mut self, command: ReplicaCommand) -> ReplicaResponse {
        match command {
            ReplicaCommand::CreateSidebar { width } => {
                self.set_width(width);
                if self.overlay.is_some() {
                    self.ensure_visible();
                    self.post(OverlayMessage::RefreshChatHistory);
                } else {
                    self.show_overlay();
                }
            }
            ReplicaCommand::GlobalSidebarStateChanged {
                is_open,
                width,
                manual_close,
            } => {
                self.set_width(width);
                self.remember(GlobalSidebarState {
                    is_open,
                    width: self.width,
                });
                self.apply_broadcast(is_open, manual_close == Some(true));
            }
            ReplicaCommand::StartCapture => {
                self.begin_capture();
            }
        }
        ReplicaResponse::ack()
    }

    /// Apply a raw JSON command, answering anything outside the vocabulary
    /// with `{error: "Unknown action"}`.
    pub fn handle_wire(&mut self, raw: &str) -> ReplicaResponse {
        match decode_command(raw) {
            Ok(command) => self.handle_command(command),
            Err(ProtocolError::UnknownAction(action)) => {
                log::warn!("[REPLICA] Unknown action {:?}", action);
                ReplicaResponse::unknown_action()
            }
            Err(e) => {
                log::warn!("[REPLICA] Rejected command: {}", e);
                ReplicaResponse::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    fn apply_broadcast(&mut self, is_open: bool, manual_close: bool) {
        match (is_open, self.overlay.is_some()) {
            (true, false) => self.show_overlay(),
            (true, true) => self.ensure_visible(),
            (false, true) if manual_close => {
                log::info!("[REPLICA] Manual close received, removing overlay");
                self.destroy_overlay();
            }
            (false, true) => {
                log::debug!("[REPLICA] Ignoring close without manual flag");
            }
            (false, false) => {}
        }
    }

    /// The user hit the close control inside the overlay. This is the only
    /// path that sends `manualClose: true`.
    pub async fn close_from_overlay(&mut self) {
        self.destroy_overlay();
        let request = CoordinatorRequest::SetSidebarState {
            is_open: false,
            width: self.width,
            manual_close: Some(true),
        };
        if let Err(e) = self.link.request(request).await {
            log::warn!("[REPLICA] Close not reported to coordinator: {}", e);
        }
    }

    /// The user opened the sidebar from inside this tab.
    pub async fn open_local(&mut self) {
        self.show_overlay();
        let request = CoordinatorRequest::SetSidebarState {
            is_open: true,
            width: self.width,
            manual_close: None,
        };
        if let Err(e) = self.link.request(request).await {
            log::warn!("[REPLICA] Open not reported to coordinator: {}", e);
        }
    }

    /// The tab became visible or regained focus. A closed answer is never
    /// treated as a manual close.
    pub async fn on_visible(&mut self) {
        let state = match self.link.request(CoordinatorRequest::GetSidebarState).await {
            Ok(CoordinatorResponse::State(state)) => state,
            Ok(other) => {
                log::warn!("[REPLICA] Unexpected state response: {:?}", other);
                return;
            }
            Err(e) => {
                log::warn!("[REPLICA] State re-query failed: {}", e);
                return;
            }
        };

        self.remember(state);
        if !state.is_open {
            return;
        }
        if self.overlay.is_some() {
            self.ensure_visible();
            self.post(OverlayMessage::RefreshChatHistory);
        } else {
            self.set_width(state.width);
            self.show_overlay();
        }
    }

    /// Commands posted up by the overlay document. Ignored once the overlay
    /// that registered the listener is gone.
    pub async fn on_overlay_event(&mut self, event: OverlayEvent) {
        if !self.listening {
            log::debug!("[REPLICA] Overlay event {:?} without a live overlay", event);
            return;
        }
        match event {
            OverlayEvent::CloseSidebar => self.close_from_overlay().await,
            OverlayEvent::StartNewCapture => {
                self.begin_capture();
            }
        }
    }

    /// Hide the overlay, put the page back, and arm the selection surface.
    /// Returns false if a capture is already in progress.
    pub fn begin_capture(&mut self) -> bool {
        if self.capture.is_some() {
            log::debug!("[CAPTURE] Capture already in progress");
            return false;
        }

        if let Some(handle) = self.overlay {
            self.page.set_overlay_visible(handle, false);
            self.overlay_hidden = true;
        }
        self.layout.restore(&mut self.page);
        self.capture = Some(CaptureSession::default());
        log::info!("[CAPTURE] Selection started in tab {}", self.tab());
        true
    }

    pub fn pointer_down(&mut self, x: f64, y: f64) {
        if let Some(session) = self.capture.as_mut() {
            session.tracker.pointer_down(x, y);
        }
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) -> Option<Region> {
        self.capture.as_mut()?.tracker.pointer_move(x, y)
    }

    pub async fn pointer_up(&mut self, x: f64, y: f64) -> CaptureOutcome {
        let Some(session) = self.capture.as_mut() else {
            return CaptureOutcome::Ignored;
        };
        match session.tracker.pointer_up(x, y) {
            Selection::Cancelled => {
                self.cancel_capture();
                CaptureOutcome::Cancelled
            }
            Selection::Captured(region) => {
                session.region = Some(region);
                self.complete_capture(region).await
            }
        }
    }

    /// Abandon the live capture session, if any, and restore the overlay.
    pub fn cancel_capture(&mut self) -> bool {
        if self.capture.take().is_none() {
            return false;
        }
        log::info!("[CAPTURE] Selection cancelled");
        self.restore_after_capture();
        true
    }

    async fn complete_capture(&mut self, region: Region) -> CaptureOutcome {
        let start = std::time::Instant::now();
        let screen = ScreenRegion::new(region, self.page.device_pixel_ratio());

        let cropped = match self.link.request(CoordinatorRequest::CaptureTab { area: region }).await {
            Ok(CoordinatorResponse::Captured { data_url }) => {
                crop_data_url(data_url, screen).await.map_err(|e| e.to_string())
            }
            Ok(CoordinatorResponse::Error { error }) => Err(error),
            Ok(other) => Err(format!("unexpected capture response {:?}", other)),
            Err(e) => Err(e.to_string()),
        };

        let (png, placeholder) = match cropped {
            Ok(bytes) => {
                log::info!(
                    "[CAPTURE] Region {}x{} cropped in {}ms",
                    region.width,
                    region.height,
                    start.elapsed().as_millis()
                );
                (bytes, false)
            }
            Err(reason) => {
                log::warn!("[CAPTURE] Capture failed, using placeholder: {}", reason);
                let width = region.width.round().max(1.0) as u32;
                let height = region.height.round().max(1.0) as u32;
                (placeholder_png(width, height), true)
            }
        };

        self.capture = None;
        self.restore_after_capture();

        let image_data = png_data_url(&png);
        self.post(OverlayMessage::SetImage {
            image_data: image_data.clone(),
        });
        CaptureOutcome::Delivered {
            image_data,
            placeholder,
        }
    }

    fn restore_after_capture(&mut self) {
        if let Some(handle) = self.overlay {
            self.page.set_overlay_visible(handle, true);
            self.overlay_hidden = false;
            self.layout.adjust(&mut self.page, self.width);
        }
    }

    fn show_overlay(&mut self) {
        if self.overlay.is_some() {
            self.ensure_visible();
            return;
        }
        let handle = self.page.mount_overlay(self.width);
        self.overlay = Some(handle);
        self.listening = true;
        if self.capture.is_some() {
            // Stays out of the screenshot; the capture restores it when done.
            self.page.set_overlay_visible(handle, false);
            self.overlay_hidden = true;
        } else {
            self.overlay_hidden = false;
            self.layout.adjust(&mut self.page, self.width);
        }
        log::info!("[REPLICA] Overlay created in tab {} ({}px)", self.tab(), self.width);
    }

    fn ensure_visible(&mut self) {
        // A live capture owns visibility until it finishes.
        if self.capture.is_some() {
            return;
        }
        if let Some(handle) = self.overlay {
            self.page.set_overlay_visible(handle, true);
            self.overlay_hidden = false;
            self.layout.adjust(&mut self.page, self.width);
        }
    }

    fn destroy_overlay(&mut self) {
        let Some(handle) = self.overlay.take() else {
            return;
        };
        self.capture = None;
        self.listening = false;
        self.overlay_hidden = false;
        self.page.remove_overlay(handle);
        self.layout.restore(&mut self.page);
        log::info!("[REPLICA] Overlay removed from tab {}", self.tab());
    }

    fn post(&mut self, message: OverlayMessage) {
        if let Some(handle) = self.overlay {
            self.page.post_to_overlay(handle, message);
        }
    }

    fn remember(&mut self, state: GlobalSidebarState) {
        self.set_width(state.width);
        self.cached = Some(state);
    }

    fn set_width(&mut self, width: u32) {
        if width > 0 {
            self.width = width;
        }
    }
}
