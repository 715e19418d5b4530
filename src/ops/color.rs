use crate::frame::{luma, Frame};

/// Brightness, contrast and saturation evaluated together in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorControls {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for ColorControls {
    fn default() -> Self {
        Self { brightness: 0.0, contrast: 1.0, saturation: 1.0 }
    }
}

impl ColorControls {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    #[inline]
    pub fn apply_px(&self, px: [f32; 4]) -> [f32; 4] {
        let l = luma(&px);
        let mut out = px;
        for c in out.iter_mut().take(3) {
            let saturated = l + (*c - l) * self.saturation;
            let contrasted = (saturated - 0.5) * self.contrast + 0.5;
            *c = (contrasted + self.brightness).clamp(0.0, 1.0);
        }
        out
    }
}

pub fn color_controls(frame: &Frame, controls: ColorControls) -> Frame {
    frame.map_pixels(|px| controls.apply_px(px))
}

/// Exposure in EV stops.
pub fn exposure(frame: &Frame, ev: f32) -> Frame {
    let factor = 2f32.powf(ev);
    frame.map_pixels(|px| {
        [
            (px[0] * factor).clamp(0.0, 1.0),
            (px[1] * factor).clamp(0.0, 1.0),
            (px[2] * factor).clamp(0.0, 1.0),
            px[3],
        ]
    })
}

/// Approximate white point of a black body at `kelvin`, each channel in 0..=1.
pub fn kelvin_to_rgb(kelvin: f32) -> [f32; 3] {
    let t = kelvin.clamp(1000.0, 40000.0) / 100.0;

    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_73 * (t - 60.0).powf(-0.133_204_76)
    };
    let g = if t <= 66.0 {
        99.470_8 * t.ln() - 161.119_57
    } else {
        288.122_16 * (t - 60.0).powf(-0.075_514_85)
    };
    let b = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_73 * (t - 10.0).ln() - 305.044_8
    };

    [r, g, b].map(|v| (v / 255.0).clamp(0.0, 1.0))
}

/// Per-channel gains for a temperature/tint correction relative to 6500K.
/// Higher temperatures warm the image, positive tint pushes toward magenta.
pub fn white_balance_gains(temperature: f32, tint: f32) -> [f32; 3] {
    let reference = kelvin_to_rgb(crate::edit_state::NEUTRAL_TEMPERATURE);
    let target = kelvin_to_rgb(temperature);

    let mut gains = [0.0f32; 3];
    for c in 0..3 {
        gains[c] = (reference[c] / target[c].max(0.02)).powf(0.4);
    }
    let t = tint / 100.0;
    gains[0] *= 1.0 + t * 0.075;
    gains[1] *= 1.0 - t * 0.15;
    gains[2] *= 1.0 + t * 0.075;

    // Keep overall luminance stable
    let norm = luma(&[gains[0], gains[1], gains[2], 1.0]).max(1e-3);
    gains.map(|g| g / norm)
}

pub fn white_balance(frame: &Frame, temperature: f32, tint: f32) -> Frame {
    let gains = white_balance_gains(temperature, tint);
    frame.map_pixels(|px| {
        [
            (px[0] * gains[0]).clamp(0.0, 1.0),
            (px[1] * gains[1]).clamp(0.0, 1.0),
            (px[2] * gains[2]).clamp(0.0, 1.0),
            px[3],
        ]
    })
}

/// Saturation boost weighted toward muted colors. `amount` in -1..=1.
pub fn vibrance(frame: &Frame, amount: f32) -> Frame {
    frame.map_pixels(|px| {
        let l = luma(&px);
        let mut out = px;
        for c in out.iter_mut().take(3) {
            let sat = (*c - l).abs();
            let boost = 1.0 + amount * (1.0 - (sat * 3.0).clamp(0.0, 1.0));
            *c = (l + (*c - l) * boost).clamp(0.0, 1.0);
        }
        out
    })
}

pub fn invert(frame: &Frame) -> Frame {
    frame.map_pixels(|px| [1.0 - px[0], 1.0 - px[1], 1.0 - px[2], px[3]])
}

pub fn desaturate(frame: &Frame) -> Frame {
    frame.map_pixels(|px| {
        let l = luma(&px);
        [l, l, l, px[3]]
    })
}

/// Multiplies color channels by `tint`, leaving alpha alone.
pub fn tinted(frame: &Frame, tint: [f32; 3]) -> Frame {
    frame.map_pixels(|px| [px[0] * tint[0], px[1] * tint[1], px[2] * tint[2], px[3]])
}

/// 3x3 color matrix with per-channel offset, clamped.
pub fn color_matrix(frame: &Frame, m: [[f32; 3]; 3], offset: [f32; 3]) -> Frame {
    frame.map_pixels(|px| {
        let mut out = px;
        for (row, (coeffs, bias)) in m.iter().zip(offset).enumerate() {
            out[row] = (coeffs[0] * px[0] + coeffs[1] * px[1] + coeffs[2] * px[2] + bias).clamp(0.0, 1.0);
        }
        out
    })
}

/// Piecewise-linear tone curve through sorted control points, applied to each color channel.
pub fn tone_curve(frame: &Frame, points: &[(f32, f32)]) -> Frame {
    let points = points.to_vec();
    frame.map_pixels(|px| {
        [
            interp_curve(px[0], &points),
            interp_curve(px[1], &points),
            interp_curve(px[2], &points),
            px[3],
        ]
    })
}

pub fn interp_curve(x: f32, points: &[(f32, f32)]) -> f32 {
    match points {
        [] => x,
        [(_, y)] => *y,
        _ => {
            if x <= points[0].0 {
                return points[0].1;
            }
            for pair in points.windows(2) {
                let (x0, y0) = pair[0];
                let (x1, y1) = pair[1];
                if x <= x1 {
                    let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 1.0 };
                    return y0 + (y1 - y0) * t;
                }
            }
            points[points.len() - 1].1
        }
    }
}
