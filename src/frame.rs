//! Working image type threaded through the filter graph.
//!
//! A [`Frame`] is a straight-alpha RGBA f32 buffer placed at an integer origin in an
//! unbounded plane. Stages that blur or translate grow the extent; the graph's terminal
//! clamp crops back to the processed source extent.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgba, Rgba32FImage, RgbaImage};
use rayon::prelude::*;

pub const LUMA_REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

#[inline]
pub fn luma(px: &[f32; 4]) -> f32 {
    px[0] * LUMA_REC709[0] + px[1] * LUMA_REC709[1] + px[2] * LUMA_REC709[2]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Rect::new(x0, y0, 0, 0);
        }
        Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    pub fn inset(&self, by: i32) -> Rect {
        let w = (self.width as i32 - 2 * by).max(0) as u32;
        let h = (self.height as i32 - 2 * by).max(0) as u32;
        Rect::new(self.x + by, self.y + by, w, h)
    }

    pub fn max_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 * 0.5,
            self.y as f32 + self.height as f32 * 0.5,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Rgba32FImage,
    origin: (i32, i32),
}

impl Frame {
    pub fn from_pixels(pixels: Rgba32FImage) -> Self {
        Self { pixels, origin: (0, 0) }
    }

    pub fn with_origin(pixels: Rgba32FImage, x: i32, y: i32) -> Self {
        Self { pixels, origin: (x, y) }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::from_pixels(image.to_rgba32f())
    }

    pub fn from_rgba8(image: &RgbaImage) -> Self {
        let (w, h) = image.dimensions();
        let data: Vec<f32> = image.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        // Length always matches w * h * 4 for a well-formed RgbaImage
        let pixels = ImageBuffer::from_raw(w, h, data).unwrap_or_else(|| ImageBuffer::new(w, h));
        Self::from_pixels(pixels)
    }

    pub fn solid(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self::from_pixels(ImageBuffer::from_pixel(width, height, Rgba(color)))
    }

    /// Materializes a generator over `rect`. Generators are conceptually unbounded, so the
    /// caller always picks the window.
    pub fn generate<F>(rect: Rect, f: F) -> Self
    where
        F: Fn(f32, f32) -> [f32; 4] + Sync,
    {
        let mut pixels: Rgba32FImage = ImageBuffer::new(rect.width, rect.height);
        let row_len = rect.width as usize * 4;
        if row_len > 0 {
            pixels.par_chunks_mut(row_len).enumerate().for_each(|(row, data)| {
                let gy = rect.y as f32 + row as f32 + 0.5;
                for (col, px) in data.chunks_exact_mut(4).enumerate() {
                    let gx = rect.x as f32 + col as f32 + 0.5;
                    px.copy_from_slice(&f(gx, gy));
                }
            });
        }
        Self::with_origin(pixels, rect.x, rect.y)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    pub fn extent(&self) -> Rect {
        Rect::new(self.origin.0, self.origin.1, self.width(), self.height())
    }

    pub fn pixels(&self) -> &Rgba32FImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> Rgba32FImage {
        self.pixels
    }

    pub fn is_finite(&self) -> bool {
        !self.extent().is_empty() && self.pixels.as_raw().iter().all(|v| v.is_finite())
    }

    /// Moves the frame so its extent starts at (0, 0).
    pub fn reanchored(mut self) -> Self {
        self.origin = (0, 0);
        self
    }

    pub fn translated(mut self, dx: i32, dy: i32) -> Self {
        self.origin = (self.origin.0 + dx, self.origin.1 + dy);
        self
    }

    /// Pixel at global coordinates, transparent black outside the extent.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> [f32; 4] {
        let lx = x - self.origin.0;
        let ly = y - self.origin.1;
        if lx < 0 || ly < 0 || lx >= self.width() as i32 || ly >= self.height() as i32 {
            return [0.0; 4];
        }
        self.pixels.get_pixel(lx as u32, ly as u32).0
    }

    /// Pixel at global coordinates with coordinates clamped to the extent.
    #[inline]
    pub fn get_clamped(&self, x: i32, y: i32) -> [f32; 4] {
        let lx = (x - self.origin.0).clamp(0, self.width() as i32 - 1);
        let ly = (y - self.origin.1).clamp(0, self.height() as i32 - 1);
        self.pixels.get_pixel(lx as u32, ly as u32).0
    }

    /// Bilinear sample at continuous global coordinates (pixel centers at +0.5).
    pub fn sample_bilinear(&self, x: f32, y: f32) -> [f32; 4] {
        let fx = x - 0.5;
        let fy = y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let p00 = self.get(x0, y0);
        let p10 = self.get(x0 + 1, y0);
        let p01 = self.get(x0, y0 + 1);
        let p11 = self.get(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for c in 0..4 {
            let top = p00[c] + (p10[c] - p00[c]) * tx;
            let bottom = p01[c] + (p11[c] - p01[c]) * tx;
            out[c] = top + (bottom - top) * ty;
        }
        out
    }

    /// Copies the part of the frame inside `rect`. Returns an empty frame if they don't overlap.
    pub fn cropped(&self, rect: Rect) -> Frame {
        let r = self.extent().intersect(&rect);
        if r.is_empty() {
            return Frame::with_origin(ImageBuffer::new(0, 0), r.x, r.y);
        }
        let lx = (r.x - self.origin.0) as u32;
        let ly = (r.y - self.origin.1) as u32;
        let view = image::imageops::crop_imm(&self.pixels, lx, ly, r.width, r.height).to_image();
        Frame::with_origin(view, r.x, r.y)
    }

    /// Re-renders the frame onto exactly `rect`, filling uncovered pixels with transparency.
    pub fn fitted_to(&self, rect: Rect) -> Frame {
        if self.extent() == rect {
            return self.clone();
        }
        Frame::generate(rect, |x, y| self.get(x.floor() as i32, y.floor() as i32))
    }

    pub fn map_pixels<F>(&self, f: F) -> Frame
    where
        F: Fn([f32; 4]) -> [f32; 4] + Sync,
    {
        let mut pixels = self.pixels.clone();
        pixels.par_chunks_mut(4).for_each(|px| {
            let out = f([px[0], px[1], px[2], px[3]]);
            px.copy_from_slice(&out);
        });
        Frame::with_origin(pixels, self.origin.0, self.origin.1)
    }

    /// Per-pixel map with global pixel-center coordinates.
    pub fn map_pixels_xy<F>(&self, f: F) -> Frame
    where
        F: Fn(f32, f32, [f32; 4]) -> [f32; 4] + Sync,
    {
        let mut pixels = self.pixels.clone();
        let (ox, oy) = self.origin;
        let row_len = self.width() as usize * 4;
        if row_len > 0 {
            pixels.par_chunks_mut(row_len).enumerate().for_each(|(row, data)| {
                let gy = oy as f32 + row as f32 + 0.5;
                for (col, px) in data.chunks_exact_mut(4).enumerate() {
                    let gx = ox as f32 + col as f32 + 0.5;
                    let out = f(gx, gy, [px[0], px[1], px[2], px[3]]);
                    px.copy_from_slice(&out);
                }
            });
        }
        Frame::with_origin(pixels, ox, oy)
    }

    /// Combines this frame with `other` over this frame's extent. `other` reads as
    /// transparent black where it has no coverage.
    pub fn zip_with<F>(&self, other: &Frame, f: F) -> Frame
    where
        F: Fn([f32; 4], [f32; 4]) -> [f32; 4] + Sync,
    {
        if other.extent() == self.extent() {
            let mut pixels = self.pixels.clone();
            pixels
                .par_chunks_mut(4)
                .zip(other.pixels.par_chunks(4))
                .for_each(|(a, b)| {
                    let out = f([a[0], a[1], a[2], a[3]], [b[0], b[1], b[2], b[3]]);
                    a.copy_from_slice(&out);
                });
            return Frame::with_origin(pixels, self.origin.0, self.origin.1);
        }
        self.map_pixels_xy(|x, y, a| f(a, other.get(x.floor() as i32, y.floor() as i32)))
    }

    /// High-quality resample to an exact size; origin is preserved.
    pub fn resized(&self, width: u32, height: u32, filter: FilterType) -> Frame {
        let pixels = image::imageops::resize(&self.pixels, width.max(1), height.max(1), filter);
        Frame::with_origin(pixels, self.origin.0, self.origin.1)
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        let data: Vec<u8> = self
            .pixels
            .as_raw()
            .par_iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        ImageBuffer::from_raw(self.width(), self.height(), data)
            .unwrap_or_else(|| ImageBuffer::new(self.width(), self.height()))
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.to_rgba8())
    }

    /// Mean Rec.709 luminance over all pixels.
    pub fn mean_luma(&self) -> f32 {
        let n = (self.width() as usize * self.height() as usize).max(1);
        let sum: f64 = self
            .pixels
            .par_chunks(4)
            .map(|px| luma(&[px[0], px[1], px[2], px[3]]) as f64)
            .sum();
        (sum / n as f64) as f32
    }

    /// Variance of the color channels across all pixels.
    pub fn color_variance(&self) -> f64 {
        let values: Vec<f64> = self
            .pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0] as f64, px[1] as f64, px[2] as f64])
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
    }

    /// Largest absolute per-channel difference against a frame of the same extent.
    pub fn max_abs_diff(&self, other: &Frame) -> f32 {
        if self.extent() != other.extent() {
            return f32::INFINITY;
        }
        self.pixels
            .as_raw()
            .iter()
            .zip(other.pixels.as_raw())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_union_and_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 10, 10);
        assert_eq!(a.union(&b), Rect::new(0, -5, 15, 15));
        assert_eq!(a.intersect(&b), Rect::new(5, 0, 5, 5));
        assert!(a.intersect(&Rect::new(20, 20, 2, 2)).is_empty());
    }

    #[test]
    fn crop_keeps_global_position() {
        let frame = Frame::generate(Rect::new(0, 0, 8, 8), |x, _| [x / 8.0, 0.0, 0.0, 1.0]);
        let crop = frame.cropped(Rect::new(2, 3, 4, 4));
        assert_eq!(crop.extent(), Rect::new(2, 3, 4, 4));
        assert_eq!(crop.get(2, 3), frame.get(2, 3));
        assert_eq!(crop.reanchored().extent(), Rect::new(0, 0, 4, 4));
    }

    #[test]
    fn rgba8_round_trip_is_exact() {
        let src = RgbaImage::from_fn(16, 4, |x, y| Rgba([(x * 16) as u8, (y * 60) as u8, 128, 255]));
        let frame = Frame::from_rgba8(&src);
        assert_eq!(frame.to_rgba8(), src);
    }

    #[test]
    fn bilinear_hits_pixel_centers() {
        let frame = Frame::generate(Rect::new(0, 0, 4, 4), |x, y| [x, y, 0.0, 1.0]);
        let px = frame.sample_bilinear(1.5, 2.5);
        assert!((px[0] - 1.5).abs() < 1e-6);
        assert!((px[1] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn fitted_to_pads_with_transparency() {
        let frame = Frame::solid(2, 2, [1.0; 4]).translated(1, 1);
        let fitted = frame.fitted_to(Rect::new(0, 0, 4, 4));
        assert_eq!(fitted.get(0, 0), [0.0; 4]);
        assert_eq!(fitted.get(1, 1), [1.0; 4]);
    }
}
