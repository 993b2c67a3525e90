//! Capture handshake across the bus: the replica hides its overlay, asks the
//! coordinator for the visible surface, crops it, and hands the image back
//! to the overlay.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use snip_sidebar_lib::capture::{decode_data_url, FrameSurface};
use snip_sidebar_lib::chat::{ChatClient, ChatPanel, ChatThread, RequestGate};
use snip_sidebar_lib::coordinator::{spawn_coordinator, SidebarCoordinator, Timings};
use snip_sidebar_lib::init_logging;
use snip_sidebar_lib::protocol::{
    GlobalSidebarState, LocalBus, OverlayEvent, OverlayMessage, ReplicaCommand, TabId,
};
use snip_sidebar_lib::replica::{
    spawn_replica, CaptureOutcome, MemoryPage, PageHost, ReplicaHandle, ReplicaPhase,
};
use std::sync::Arc;
use std::time::Duration;

/// Left half blue, right half red.
fn split_frame(width: u32, height: u32) -> DynamicImage {
    let mut frame = RgbaImage::new(width, height);
    for (x, _, px) in frame.enumerate_pixels_mut() {
        *px = if x < width / 2 {
            Rgba([0, 0, 255, 255])
        } else {
            Rgba([255, 0, 0, 255])
        };
    }
    DynamicImage::ImageRgba8(frame)
}

async fn open_tab(surface: FrameSurface) -> (ReplicaHandle, MemoryPage) {
    init_logging();
    let bus = LocalBus::new();
    spawn_coordinator(
        &bus,
        SidebarCoordinator::with_state(
            GlobalSidebarState {
                is_open: true,
                width: 400,
            },
            Timings::immediate(),
        ),
        Arc::new(surface),
    );
    let page = MemoryPage::new();
    let handle = spawn_replica(&bus, TabId(1), page.clone());
    let status = handle.status().await.expect("replica running");
    assert_eq!(status.phase, ReplicaPhase::OverlayVisible);
    (handle, page)
}

fn delivered(outcome: Option<CaptureOutcome>) -> (DynamicImage, bool) {
    match outcome {
        Some(CaptureOutcome::Delivered {
            image_data,
            placeholder,
        }) => {
            let bytes = decode_data_url(&image_data).expect("data url").bytes;
            (image::load_from_memory(&bytes).expect("png"), placeholder)
        }
        other => panic!("expected a delivered image, got {:?}", other),
    }
}

#[tokio::test]
async fn selection_is_cropped_from_the_visible_surface() {
    let (tab, page) = open_tab(FrameSurface::with_frame(split_frame(200, 100))).await;

    tab.overlay_event(OverlayEvent::StartNewCapture);
    let status = tab.status().await.unwrap();
    assert_eq!(status.phase, ReplicaPhase::HiddenForCapture);
    assert!(!status.layout_adjusted);

    tab.pointer_down(120.0, 20.0);
    tab.pointer_move(150.0, 50.0);
    let (img, placeholder) = delivered(tab.pointer_up(160.0, 60.0).await);

    assert!(!placeholder);
    assert_eq!(img.dimensions(), (40, 40));
    assert_eq!(img.get_pixel(20, 20), Rgba([255, 0, 0, 255]));

    let status = tab.status().await.unwrap();
    assert_eq!(status.phase, ReplicaPhase::OverlayVisible);
    assert!(status.layout_adjusted);
    assert!(page
        .snapshot()
        .messages()
        .any(|m| matches!(m, OverlayMessage::SetImage { .. })));
}

#[tokio::test]
async fn device_pixel_ratio_is_applied() {
    // 2x device frame for a 100x50 viewport.
    let (tab, page) = open_tab(FrameSurface::with_frame(split_frame(200, 100))).await;
    page.set_device_pixel_ratio(2.0);

    tab.command(ReplicaCommand::StartCapture).await;
    tab.pointer_down(10.0, 10.0);
    let (img, _) = delivered(tab.pointer_up(40.0, 30.0).await);

    assert_eq!(img.dimensions(), (30, 20));
    assert_eq!(img.get_pixel(15, 10), Rgba([0, 0, 255, 255]));
}

#[tokio::test]
async fn missing_screenshot_degrades_to_placeholder() {
    let (tab, page) = open_tab(FrameSurface::new()).await;

    tab.overlay_event(OverlayEvent::StartNewCapture);
    tab.pointer_down(0.0, 0.0);
    let (img, placeholder) = delivered(tab.pointer_up(80.0, 60.0).await);

    assert!(placeholder);
    assert_eq!(img.dimensions(), (80, 60));
    let status = tab.status().await.unwrap();
    assert_eq!(status.phase, ReplicaPhase::OverlayVisible);
    assert!(!status.capturing);
    assert_eq!(page.read_layout().margin_right, "400px");
}

#[tokio::test]
async fn tiny_selection_cancels_and_restores() {
    let (tab, page) = open_tab(FrameSurface::with_frame(split_frame(200, 100))).await;

    tab.overlay_event(OverlayEvent::StartNewCapture);
    tab.pointer_down(50.0, 50.0);
    assert_eq!(tab.pointer_up(55.0, 90.0).await, Some(CaptureOutcome::Cancelled));

    let status = tab.status().await.unwrap();
    assert_eq!(status.phase, ReplicaPhase::OverlayVisible);
    assert!(status.layout_adjusted);
    assert!(!page
        .snapshot()
        .messages()
        .any(|m| matches!(m, OverlayMessage::SetImage { .. })));
}

#[tokio::test]
async fn escape_cancels_capture() {
    let (tab, page) = open_tab(FrameSurface::with_frame(split_frame(200, 100))).await;

    tab.overlay_event(OverlayEvent::StartNewCapture);
    tab.pointer_down(0.0, 0.0);
    tab.cancel_capture();

    let status = tab.status().await.unwrap();
    assert_eq!(status.phase, ReplicaPhase::OverlayVisible);
    assert!(!status.capturing);
    assert_eq!(page.snapshot().overlay().map(|o| o.visible), Some(true));
    assert_eq!(tab.pointer_up(100.0, 100.0).await, Some(CaptureOutcome::Ignored));
}

#[tokio::test]
async fn captured_image_becomes_the_next_attachment() {
    let (tab, page) = open_tab(FrameSurface::with_frame(split_frame(200, 100))).await;

    tab.overlay_event(OverlayEvent::StartNewCapture);
    tab.pointer_down(0.0, 0.0);
    delivered(tab.pointer_up(50.0, 50.0).await);

    let mut panel = ChatPanel::new(
        ChatClient::new("http://127.0.0.1:9"),
        Arc::new(RequestGate::new(Duration::ZERO)),
        ChatThread::new("1", "Default"),
        10 * 1024 * 1024,
    );
    let set_image = page
        .snapshot()
        .messages()
        .find(|m| matches!(m, OverlayMessage::SetImage { .. }))
        .cloned()
        .expect("image posted to overlay");
    panel.on_overlay_message(set_image).await.unwrap();

    let staged = panel.composer().unused_attachment().expect("staged");
    let img = image::load_from_memory(&staged.bytes).unwrap();
    assert_eq!(img.dimensions(), (50, 50));
}
