//! Stand-in image used when a capture or crop fails.
//!
//! A failed screenshot must never block the chat flow, so the replica
//! attaches this instead: a light diagonal gradient, a thin border and a
//! camera glyph in the middle, sized like the user's selection.

use super::region::encode_png;
use image::{DynamicImage, Rgba, RgbaImage};

const GRADIENT_FROM: [u8; 3] = [0xf8, 0xf9, 0xfa];
const GRADIENT_TO: [u8; 3] = [0xe9, 0xec, 0xef];
const BORDER: Rgba<u8> = Rgba([0xde, 0xe2, 0xe6, 0xff]);
const GLYPH: Rgba<u8> = Rgba([0x49, 0x50, 0x57, 0xff]);
const BORDER_PX: u32 = 2;

/// 1x1 PNG, used only if encoding the placeholder itself fails.
const LAST_RESORT_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0x60, 0xf8, 0x5f, 0x0f, 0x00, 0x02, 0x87, 0x01, 0x80, 0xeb, 0x47, 0xba, 0x92, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Renders the placeholder as an in-memory image.
pub fn placeholder_image(width: u32, height: u32) -> RgbaImage {
    let (w, h) = (width.max(1), height.max(1));
    let span = (w + h).saturating_sub(2).max(1) as f32;

    let mut img = RgbaImage::from_fn(w, h, |x, y| {
        let t = (x + y) as f32 / span;
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba([
            mix(GRADIENT_FROM[0], GRADIENT_TO[0]),
            mix(GRADIENT_FROM[1], GRADIENT_TO[1]),
            mix(GRADIENT_FROM[2], GRADIENT_TO[2]),
            0xff,
        ])
    });

    for (x, y, px) in img.enumerate_pixels_mut() {
        if x < BORDER_PX || y < BORDER_PX || x + BORDER_PX >= w || y + BORDER_PX >= h {
            *px = BORDER;
        }
    }

    draw_camera(&mut img);
    img
}

/// PNG-encoded placeholder. Always returns a decodable, non-empty PNG.
pub fn placeholder_png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(placeholder_image(width, height));
    match encode_png(&img) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("[CAPTURE] Placeholder encoding failed: {}", e);
            LAST_RESORT_PNG.to_vec()
        }
    }
}

fn draw_camera(img: &mut RgbaImage) {
    let (w, h) = img.dimensions();
    let unit = w.min(h) / 4;
    if unit < 8 {
        return;
    }

    let (cx, cy) = (w as i64 / 2, h as i64 / 2);
    let body_w = unit as i64 * 2;
    let body_h = (unit as i64 * 3) / 2;
    let lens_r = body_h / 3;
    let bump_w = body_w / 3;
    let bump_h = body_h / 5;

    let body = (cx - body_w / 2, cy - body_h / 2, cx + body_w / 2, cy + body_h / 2);
    let bump = (cx - bump_w / 2, body.1 - bump_h, cx + bump_w / 2, body.1);

    for (x, y, px) in img.enumerate_pixels_mut() {
        let (x, y) = (x as i64, y as i64);
        let in_rect = |r: (i64, i64, i64, i64)| x >= r.0 && x < r.2 && y >= r.1 && y < r.3;
        let d2 = (x - cx).pow(2) + (y - cy).pow(2);

        if in_rect(body) || in_rect(bump) {
            // Lens: a ring of background colour inside the body
            let ring = d2 <= lens_r.pow(2) && d2 >= (lens_r * 2 / 3).pow(2);
            if !ring {
                *px = GLYPH;
            }
        }
    }
}
