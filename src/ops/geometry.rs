use image::{imageops, ImageBuffer};
use rayon::prelude::*;

use crate::edit_state::CropRect;
use crate::frame::Frame;

/// Normalizes an angle into [0, 360).
pub fn normalize_degrees(degrees: f32) -> f32 {
    let d = degrees % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

/// Rotates counter-clockwise by `degrees` into the bounding box of the rotated extent,
/// re-anchored at the origin. Quarter turns are exact.
pub fn rotate(frame: &Frame, degrees: f32) -> Frame {
    let d = normalize_degrees(degrees);
    let pixels = frame.pixels();
    if d == 0.0 {
        return frame.clone().reanchored();
    } else if d == 90.0 {
        return Frame::from_pixels(imageops::rotate270(pixels));
    } else if d == 180.0 {
        return Frame::from_pixels(imageops::rotate180(pixels));
    } else if d == 270.0 {
        return Frame::from_pixels(imageops::rotate90(pixels));
    }

    let theta = d.to_radians();
    let (sin, cos) = theta.sin_cos();
    let w = frame.width() as f32;
    let h = frame.height() as f32;
    let out_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;

    let (ox, oy) = frame.origin();
    let src_cx = ox as f32 + w * 0.5;
    let src_cy = oy as f32 + h * 0.5;
    let dst_cx = out_w as f32 * 0.5;
    let dst_cy = out_h as f32 * 0.5;

    let mut out: image::Rgba32FImage = ImageBuffer::new(out_w, out_h);
    let row_len = out_w as usize * 4;
    out.par_chunks_mut(row_len).enumerate().for_each(|(row, data)| {
        let v = row as f32 + 0.5 - dst_cy;
        for (col, px) in data.chunks_exact_mut(4).enumerate() {
            let u = col as f32 + 0.5 - dst_cx;
            // Inverse of a visual counter-clockwise turn in y-down space
            let sx = u * cos - v * sin + src_cx;
            let sy = u * sin + v * cos + src_cy;
            px.copy_from_slice(&frame.sample_bilinear(sx, sy));
        }
    });
    Frame::from_pixels(out)
}

/// Crops with a normalized rect and re-anchors. Empty or full crops return the input.
pub fn crop(frame: &Frame, rect: &CropRect) -> Frame {
    if rect.is_empty() || rect.is_full() {
        return frame.clone();
    }
    let pixel_rect = rect.to_pixels(frame.extent());
    if pixel_rect.is_empty() {
        return frame.clone();
    }
    frame.cropped(pixel_rect).reanchored()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let frame = Frame::generate(Rect::new(0, 0, 6, 3), |x, y| [x / 6.0, y / 3.0, 0.0, 1.0]);
        let rotated = rotate(&frame, 90.0);
        assert_eq!((rotated.width(), rotated.height()), (3, 6));
        // Top-right corner moves to top-left on a counter-clockwise turn
        assert_eq!(rotated.get(0, 0), frame.get(5, 0));
        assert_eq!(rotate(&frame, -270.0), rotated);
    }

    #[test]
    fn arbitrary_angle_grows_to_bounding_box() {
        let frame = Frame::solid(100, 50, [1.0; 4]);
        let rotated = rotate(&frame, 30.0);
        assert_eq!(rotated.origin(), (0, 0));
        assert_eq!(rotated.width(), (100.0 * 0.866_025 + 50.0 * 0.5f32).ceil() as u32);
        // Corners of the bounding box fall outside the rotated content
        assert_eq!(rotated.get(0, 0)[3], 0.0);
        let (cx, cy) = rotated.extent().center();
        assert!(rotated.get(cx as i32, cy as i32)[3] > 0.99);
    }

    #[test]
    fn crop_reanchors() {
        let frame = Frame::solid(200, 100, [0.5; 4]);
        let cropped = crop(&frame, &CropRect::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(cropped.extent(), Rect::new(0, 0, 100, 50));
        assert_eq!(crop(&frame, &CropRect::new(0.1, 0.1, 0.0, 0.5)), frame);
    }
}
