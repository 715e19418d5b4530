//! Spatial effects assembled from the color, blur, distortion and blend primitives.
//! Each effect is a typed parameter struct built from a 0..=1 intensity and the current extent.

use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect as DrawRect;

use super::blend::{dissolve, screen, source_over, with_opacity};
use super::blur::gaussian_blur;
use super::color::{self, ColorControls};
use super::distort::{bump_distortion, channel_split};
use super::generators::{linear_gradient, midtone_mask, radial_mask, smoothstep, white_noise};
use crate::frame::{luma, Frame, Rect};

fn half_diagonal(extent: Rect) -> f32 {
    let w = extent.width as f32;
    let h = extent.height as f32;
    (w * w + h * h).sqrt() * 0.5
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vignette {
    pub intensity: f32,
    /// Fraction of the half diagonal where darkening reaches full strength
    pub radius: f32,
}

impl Vignette {
    pub fn new(intensity: f32) -> Self {
        Self { intensity, radius: 1.05 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let extent = frame.extent();
        let center = extent.center();
        let reach = half_diagonal(extent);
        let inner = reach * self.radius * 0.4;
        let outer = reach * self.radius;
        frame.map_pixels_xy(|x, y, px| {
            let k = 1.0 - self.intensity * radial_mask(x, y, center, inner, outer);
            [px[0] * k, px[1] * k, px[2] * k, px[3]]
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solarize {
    pub intensity: f32,
    pub contrast: f32,
}

impl Solarize {
    pub fn new(intensity: f32) -> Self {
        Self { intensity, contrast: 1.5 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let boosted = color::color_controls(
            frame,
            ColorControls { contrast: self.contrast, ..Default::default() },
        );
        let inverted = color::invert(&boosted);
        dissolve(frame, &inverted, self.intensity)
    }
}

/// RGB split with independent red/blue translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glitch {
    pub offset: i32,
}

impl Glitch {
    pub fn new(intensity: f32, extent: Rect) -> Self {
        Self { offset: (intensity * 0.03 * extent.width as f32).round() as i32 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        if self.offset == 0 {
            return frame.clone();
        }
        channel_split(frame, (self.offset, 0), (-self.offset, self.offset / 3))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fisheye {
    pub radius: f32,
    pub scale: f32,
}

impl Fisheye {
    pub fn new(intensity: f32, extent: Rect) -> Self {
        Self { radius: half_diagonal(extent) * 0.9, scale: intensity * 0.6 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        bump_distortion(frame, self.radius, self.scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub intensity: f32,
    pub contrast: f32,
}

impl Threshold {
    pub fn new(intensity: f32) -> Self {
        Self { intensity, contrast: 20.0 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let contrast = self.contrast;
        let hard = frame.map_pixels(|px| {
            let v = ((luma(&px) - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
            [v, v, v, px[3]]
        });
        dissolve(frame, &hard, self.intensity)
    }
}

/// Channel split weighted by a center-to-edge mask so the middle stays sharp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaticAberration {
    pub offset: i32,
}

impl ChromaticAberration {
    pub fn new(intensity: f32, extent: Rect) -> Self {
        Self { offset: (intensity * 0.012 * extent.max_dimension() as f32).round() as i32 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        if self.offset == 0 {
            return frame.clone();
        }
        let split = channel_split(frame, (self.offset, 0), (-self.offset, 0));
        let extent = frame.extent();
        let center = extent.center();
        let reach = half_diagonal(extent);
        frame.map_pixels_xy(|x, y, px| {
            let m = radial_mask(x, y, center, reach * 0.15, reach);
            let s = split.get(x.floor() as i32, y.floor() as i32);
            let mut out = px;
            for c in 0..3 {
                out[c] = px[c] + (s[c] - px[c]) * m;
            }
            out
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Halation {
    pub intensity: f32,
    pub sigma: f32,
    pub tint: [f32; 3],
}

impl Halation {
    pub fn new(intensity: f32, extent: Rect) -> Self {
        Self {
            intensity,
            sigma: (extent.max_dimension() as f32 * 0.02).max(1.0),
            tint: [1.0, 0.35, 0.15],
        }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let gain = 2f32.powf(1.5);
        let highlights = frame.map_pixels(|px| {
            let m = smoothstep(0.55, 0.95, luma(&px));
            [
                (px[0] * gain).min(1.0) * m,
                (px[1] * gain).min(1.0) * m,
                (px[2] * gain).min(1.0) * m,
                px[3],
            ]
        });
        let glow = gaussian_blur(&highlights, self.sigma);
        let tint = self.tint.map(|t| t * self.intensity);
        screen(frame, &color::tinted(&glow, tint))
    }
}

/// Warm directional gradient entering from the left edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilmBurn {
    pub intensity: f32,
    pub color: [f32; 3],
    /// Fraction of the width the burn reaches
    pub reach: f32,
}

impl FilmBurn {
    pub fn new(intensity: f32) -> Self {
        Self { intensity, color: [1.0, 0.45, 0.1], reach: 0.55 }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let extent = frame.extent();
        let x0 = extent.x as f32;
        let y0 = extent.y as f32;
        let x1 = x0 + extent.width as f32 * self.reach;
        let y1 = y0 + extent.height as f32 * 0.25;
        let [r, g, b] = self.color;
        let gradient = linear_gradient(extent, (x0, y0), [r, g, b, self.intensity], (x1, y1), [r, g, b, 0.0]);
        screen(frame, &gradient)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftDiffusion {
    pub intensity: f32,
    pub sigma: f32,
    pub exposure: f32,
}

impl SoftDiffusion {
    pub fn new(intensity: f32, extent: Rect) -> Self {
        Self {
            intensity,
            sigma: (extent.max_dimension() as f32 * 0.01).max(1.0),
            exposure: 0.3,
        }
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let glow = color::exposure(&gaussian_blur(frame, self.sigma), self.exposure);
        let screened = screen(frame, &glow);
        dissolve(frame, &screened, self.intensity * 0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dust {
    pub intensity: f32,
}

impl Dust {
    /// `texture` is resampled onto the frame's extent before blending.
    pub fn apply(&self, frame: &Frame, texture: &Frame) -> Frame {
        let extent = frame.extent();
        let scaled = texture
            .resized(extent.width, extent.height, image::imageops::FilterType::Triangle)
            .reanchored()
            .translated(extent.x, extent.y);
        screen(frame, &with_opacity(&scaled, self.intensity))
    }
}

/// Black bars top and bottom for a fixed target aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub intensity: f32,
    pub aspect: f32,
}

impl Letterbox {
    pub fn bar_height(&self, extent: Rect) -> u32 {
        let w = extent.width as f32;
        let h = extent.height as f32;
        if self.aspect <= 0.0 || w / h >= self.aspect {
            return 0;
        }
        ((h - w / self.aspect) * 0.5).round().max(0.0) as u32
    }

    pub fn apply(&self, frame: &Frame) -> Frame {
        let extent = frame.extent();
        let bar = self.bar_height(extent);
        if bar == 0 {
            return frame.clone();
        }
        let mut bars = image::Rgba32FImage::new(extent.width, extent.height);
        let black = image::Rgba([0.0, 0.0, 0.0, self.intensity.clamp(0.0, 1.0)]);
        draw_filled_rect_mut(&mut bars, DrawRect::at(0, 0).of_size(extent.width, bar), black);
        draw_filled_rect_mut(
            &mut bars,
            DrawRect::at(0, (extent.height - bar) as i32).of_size(extent.width, bar),
            black,
        );
        source_over(frame, &Frame::with_origin(bars, extent.x, extent.y))
    }
}

/// Luminance-weighted white noise used when the grain kernel is unavailable.
pub fn procedural_grain(frame: &Frame, amplitude: f32, seed: f32) -> Frame {
    frame.map_pixels_xy(|x, y, px| {
        let n = (white_noise(x, y, seed) - 0.5) * amplitude * midtone_mask(luma(&px));
        [
            (px[0] + n).clamp(0.0, 1.0),
            (px[1] + n).clamp(0.0, 1.0),
            (px[2] + n).clamp(0.0, 1.0),
            px[3],
        ]
    })
}
