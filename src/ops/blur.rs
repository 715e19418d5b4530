use image::{imageops, ImageBuffer, Rgba32FImage};

use crate::frame::Frame;

/// Gaussian blur whose output extent grows by three sigmas on every side, like an
/// unclipped blur. Outside the input everything reads as transparent.
pub fn gaussian_blur(frame: &Frame, sigma: f32) -> Frame {
    if sigma <= 0.0 || frame.extent().is_empty() {
        return frame.clone();
    }
    let pad = (sigma * 3.0).ceil() as u32;
    let (w, h) = (frame.width() + 2 * pad, frame.height() + 2 * pad);

    let mut padded: Rgba32FImage = ImageBuffer::new(w, h);
    imageops::replace(&mut padded, frame.pixels(), pad as i64, pad as i64);

    let blurred = imageops::blur(&padded, sigma);
    let (ox, oy) = frame.origin();
    Frame::with_origin(blurred, ox - pad as i32, oy - pad as i32)
}

/// Gaussian blur that keeps the input extent, with edge samples clamped.
pub fn gaussian_blur_clamped(frame: &Frame, sigma: f32) -> Frame {
    if sigma <= 0.0 || frame.extent().is_empty() {
        return frame.clone();
    }
    let blurred = imageops::blur(frame.pixels(), sigma);
    let (ox, oy) = frame.origin();
    Frame::with_origin(blurred, ox, oy)
}

/// Unsharp mask. `amount` of 0 returns the input.
pub fn sharpen(frame: &Frame, amount: f32, sigma: f32) -> Frame {
    if amount <= 0.0 {
        return frame.clone();
    }
    let blurred = gaussian_blur_clamped(frame, sigma);
    frame.zip_with(&blurred, |px, b| {
        let mut out = px;
        for c in 0..3 {
            out[c] = (px[c] + (px[c] - b[c]) * amount).clamp(0.0, 1.0);
        }
        out
    })
}
