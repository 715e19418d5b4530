//! Programmatic cube authoring: grading operations over an identity lattice and the
//! recipes for the featured looks.

use std::fmt::Write as _;
use std::path::Path;

use rayon::prelude::*;

use super::cube::LutBuffer;
use crate::errors::Result;
use crate::frame::LUMA_REC709;
use crate::ops::color::interp_curve;

pub const FEATURED_CUBE_SIZE: usize = 33;

#[inline]
fn lum(rgb: &[f32; 3]) -> f32 {
    rgb[0] * LUMA_REC709[0] + rgb[1] * LUMA_REC709[1] + rgb[2] * LUMA_REC709[2]
}

#[inline]
fn clip(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|v| v.clamp(0.0, 1.0))
}

/// Hue/saturation/luminance shift restricted to a hue range in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HslShift {
    pub hue: f32,
    pub saturation: f32,
    pub luminance: f32,
}

/// A cube under construction. Every operation maps each lattice entry and clips to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct CubeBuilder {
    size: usize,
    title: String,
    rows: Vec<[f32; 3]>,
}

impl CubeBuilder {
    /// Lattice mapping every grid coordinate to itself, red varying fastest.
    pub fn identity(size: usize) -> Self {
        let size = size.max(2);
        let max = (size - 1) as f32;
        let mut rows = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    rows.push([r as f32 / max, g as f32 / max, b as f32 / max]);
                }
            }
        }
        Self { size, title: "LUT".to_string(), rows }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn map<F>(mut self, f: F) -> Self
    where
        F: Fn([f32; 3]) -> [f32; 3] + Sync,
    {
        self.rows.par_iter_mut().for_each(|rgb| *rgb = clip(f(*rgb)));
        self
    }

    /// Exposure in EV stops.
    pub fn exposure(self, ev: f32) -> Self {
        let factor = 2f32.powf(ev);
        self.map(|rgb| rgb.map(|v| v * factor))
    }

    /// Contrast around mid-gray, `amount` in -100..=100.
    pub fn contrast(self, amount: f32) -> Self {
        let t = amount / 100.0;
        let k = if t > 0.0 { 1.0 + t * 0.8 } else { 1.0 + t * 0.5 };
        self.map(|rgb| rgb.map(|v| 0.5 + (v - 0.5) * k))
    }

    /// Saturation, `amount` in -100..=100.
    pub fn saturation(self, amount: f32) -> Self {
        let t = 1.0 + amount / 100.0;
        self.map(|rgb| {
            let l = lum(&rgb);
            rgb.map(|v| l + (v - l) * t)
        })
    }

    /// Boosts muted colors more than saturated ones, `amount` in -100..=100.
    pub fn vibrance(self, amount: f32) -> Self {
        let t = amount / 100.0;
        self.map(|rgb| {
            let l = lum(&rgb);
            rgb.map(|v| {
                let sat = (v - l).abs();
                let boost = 1.0 + t * (1.0 - (sat * 3.0).clamp(0.0, 1.0));
                l + (v - l) * boost
            })
        })
    }

    fn masked_offset<M>(self, amount: f32, scale: f32, mask: M) -> Self
    where
        M: Fn(f32) -> f32 + Sync,
    {
        let t = amount / 100.0;
        self.map(|rgb| {
            let m = mask(lum(&rgb));
            rgb.map(|v| v + m * t * scale)
        })
    }

    pub fn highlights(self, amount: f32) -> Self {
        self.masked_offset(amount, 0.3, |l| ((l - 0.5) * 2.0).clamp(0.0, 1.0).powf(1.5))
    }

    pub fn shadows(self, amount: f32) -> Self {
        self.masked_offset(amount, 0.3, |l| (1.0 - l * 2.0).clamp(0.0, 1.0).powf(1.5))
    }

    pub fn whites(self, amount: f32) -> Self {
        self.masked_offset(amount, 0.25, |l| ((l - 0.7) * 3.3).clamp(0.0, 1.0).powi(2))
    }

    /// Negative values deepen the blacks.
    pub fn blacks(self, amount: f32) -> Self {
        self.masked_offset(amount, 0.2, |l| (1.0 - l * 3.3).clamp(0.0, 1.0).powi(2))
    }

    /// Positive warms (red up, blue down), `amount` in -100..=100.
    pub fn temperature(self, amount: f32) -> Self {
        let t = amount / 100.0;
        self.map(|[r, g, b]| [r + t * 0.06, g + t * 0.015, b - t * 0.06])
    }

    /// Positive pushes toward magenta, negative toward green.
    pub fn tint(self, amount: f32) -> Self {
        let t = amount / 100.0;
        self.map(|[r, g, b]| [r + t * 0.02, g - t * 0.04, b + t * 0.02])
    }

    /// Raises the black point for a matte look.
    pub fn lift_blacks(self, amount: f32) -> Self {
        self.map(|rgb| rgb.map(|v| amount + v * (1.0 - amount)))
    }

    pub fn hsl_adjust(self, hue_range: (f32, f32), shift: HslShift) -> Self {
        self.map(|rgb| hsl_adjust_px(rgb, hue_range, shift))
    }

    /// Tints shadows and highlights separately; colors are centered on 0.5.
    pub fn split_tone(self, shadow_rgb: [f32; 3], highlight_rgb: [f32; 3]) -> Self {
        self.map(|rgb| {
            let l = lum(&rgb);
            let shadow = (1.0 - l * 2.0).clamp(0.0, 1.0).powf(1.2);
            let highlight = ((l - 0.5) * 2.0).clamp(0.0, 1.0).powf(1.2);
            let mut out = rgb;
            for c in 0..3 {
                out[c] += shadow * (shadow_rgb[c] - 0.5) * 0.15 + highlight * (highlight_rgb[c] - 0.5) * 0.15;
            }
            out
        })
    }

    /// Same piecewise-linear curve on every channel.
    pub fn curve(self, points: &[(f32, f32)]) -> Self {
        let mut points = points.to_vec();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.map(|rgb| rgb.map(|v| interp_curve(v, &points)))
    }

    pub fn build(&self) -> Result<LutBuffer> {
        let data = self.rows.iter().flat_map(|[r, g, b]| [*r, *g, *b, 1.0]).collect();
        LutBuffer::new(self.size, data)
    }

    /// `.cube` text: title, size and domain headers, a blank line, then one row per entry.
    pub fn to_cube_string(&self) -> String {
        let mut out = String::with_capacity(self.rows.len() * 27 + 96);
        let _ = writeln!(out, "TITLE \"{}\"", self.title);
        let _ = writeln!(out, "LUT_3D_SIZE {}", self.size);
        out.push_str("DOMAIN_MIN 0.0 0.0 0.0\n");
        out.push_str("DOMAIN_MAX 1.0 1.0 1.0\n");
        out.push('\n');
        for [r, g, b] in &self.rows {
            let _ = writeln!(out, "{:.6} {:.6} {:.6}", r, g, b);
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_cube_string())?;
        Ok(())
    }
}

fn hsl_adjust_px(rgb: [f32; 3], (h_min, h_max): (f32, f32), shift: HslShift) -> [f32; 3] {
    let [r, g, b] = rgb;
    let cmax = r.max(g).max(b);
    let cmin = r.min(g).min(b);
    let delta = cmax - cmin;

    let hue = if delta > 0.001 {
        let h = if cmax == b {
            60.0 * ((r - g) / delta + 4.0)
        } else if cmax == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        };
        h.rem_euclid(360.0)
    } else {
        0.0
    };
    let saturation = if cmax > 0.001 { delta / cmax } else { 0.0 };

    let mut strength = if h_min < h_max {
        let center = (h_min + h_max) / 2.0;
        let width = (h_max - h_min) / 2.0;
        let dist = (hue - center).abs();
        (1.0 - (dist - width * 0.6) / (width * 0.4)).clamp(0.0, 1.0)
    } else if hue >= h_min || hue <= h_max {
        1.0
    } else {
        0.0
    };
    // Leave grays alone
    strength *= (saturation * 3.0).clamp(0.0, 1.0);

    let mut out = rgb;
    if shift.saturation != 0.0 {
        let new_sat = (saturation * (1.0 + shift.saturation)).clamp(0.0, 1.0);
        let factor = if saturation > 0.001 { new_sat / saturation } else { 1.0 };
        let factor = strength * factor + (1.0 - strength);
        let l = lum(&rgb);
        out = rgb.map(|v| l + (v - l) * factor);
    }

    if shift.luminance != 0.0 {
        out = out.map(|v| v + strength * shift.luminance * 0.15);
    }

    if shift.hue != 0.0 {
        let (sin, cos) = shift.hue.to_radians().sin_cos();
        let l = lum(&out);
        let (rc, gc, bc) = (out[0] - l, out[1] - l, out[2] - l);
        let nr = rc * cos + gc * sin * 0.5;
        let ng = gc * cos - rc * sin * 0.3 + bc * sin * 0.3;
        let nb = bc * cos - gc * sin * 0.5;
        out[0] += strength * (nr - rc) * 0.5;
        out[1] += strength * (ng - gc) * 0.5;
        out[2] += strength * (nb - bc) * 0.5;
    }

    out
}

/// The five featured looks shipped as cube files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturedLook {
    Vintage,
    Mood,
    Lush,
    Dream,
    Golden,
}

impl FeaturedLook {
    pub fn all() -> &'static [FeaturedLook] {
        &[
            FeaturedLook::Vintage,
            FeaturedLook::Mood,
            FeaturedLook::Lush,
            FeaturedLook::Dream,
            FeaturedLook::Golden,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            FeaturedLook::Vintage => "ft_vintage",
            FeaturedLook::Mood => "ft_mood",
            FeaturedLook::Lush => "ft_lush",
            FeaturedLook::Dream => "ft_dream",
            FeaturedLook::Golden => "ft_golden",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FeaturedLook::Vintage => "Vintage",
            FeaturedLook::Mood => "Mood",
            FeaturedLook::Lush => "Lush",
            FeaturedLook::Dream => "Dream",
            FeaturedLook::Golden => "Golden Hour",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.cube", self.id())
    }

    pub fn build(&self, size: usize) -> CubeBuilder {
        let base = CubeBuilder::identity(size).titled(self.title());
        match self {
            // Retro 70s: matte blacks, warm earth tones
            FeaturedLook::Vintage => base
                .exposure(0.5)
                .contrast(-20.0)
                .shadows(40.0)
                .temperature(12.0)
                .tint(8.0)
                .lift_blacks(0.06)
                .hsl_adjust((15.0, 45.0), HslShift { saturation: -0.10, luminance: 0.20, ..Default::default() })
                .split_tone([0.55, 0.48, 0.42], [0.55, 0.52, 0.45])
                .curve(&[(0.0, 0.05), (0.15, 0.18), (0.5, 0.52), (0.85, 0.87), (1.0, 0.98)]),
            // Editorial: desaturated, greens and blues pulled down, teal shadows
            FeaturedLook::Mood => base
                .contrast(25.0)
                .highlights(-50.0)
                .whites(-15.0)
                .blacks(-10.0)
                .saturation(-20.0)
                .hsl_adjust((75.0, 165.0), HslShift { saturation: -0.80, ..Default::default() })
                .hsl_adjust((180.0, 260.0), HslShift { saturation: -0.80, ..Default::default() })
                .split_tone([0.45, 0.52, 0.55], [0.52, 0.50, 0.48])
                .curve(&[(0.0, 0.0), (0.20, 0.15), (0.40, 0.38), (0.60, 0.63), (0.80, 0.82), (1.0, 0.95)]),
            FeaturedLook::Lush => base
                .temperature(15.0)
                .vibrance(20.0)
                .shadows(25.0)
                .hsl_adjust((200.0, 260.0), HslShift { hue: -25.0, luminance: -0.10, ..Default::default() })
                .hsl_adjust((40.0, 70.0), HslShift { hue: -15.0, ..Default::default() })
                .hsl_adjust((15.0, 40.0), HslShift { saturation: 0.10, luminance: 0.10, ..Default::default() })
                .split_tone([0.52, 0.50, 0.45], [0.55, 0.52, 0.47])
                .curve(&[(0.0, 0.02), (0.25, 0.22), (0.50, 0.52), (0.75, 0.78), (1.0, 1.0)]),
            FeaturedLook::Dream => base
                .exposure(0.7)
                .highlights(-20.0)
                .shadows(30.0)
                .contrast(-30.0)
                .saturation(-10.0)
                .tint(10.0)
                .lift_blacks(0.08)
                .hsl_adjust((300.0, 360.0), HslShift { saturation: 0.15, luminance: 0.05, ..Default::default() })
                .hsl_adjust((0.0, 20.0), HslShift { saturation: 0.10, luminance: 0.05, ..Default::default() })
                .split_tone([0.52, 0.48, 0.55], [0.54, 0.52, 0.50])
                .curve(&[(0.0, 0.07), (0.20, 0.22), (0.50, 0.53), (0.80, 0.82), (1.0, 0.95)]),
            FeaturedLook::Golden => base
                .exposure(0.3)
                .temperature(18.0)
                .tint(5.0)
                .shadows(20.0)
                .highlights(-30.0)
                .vibrance(15.0)
                .hsl_adjust((15.0, 45.0), HslShift { saturation: 0.15, luminance: 0.15, ..Default::default() })
                .hsl_adjust((40.0, 70.0), HslShift { hue: -10.0, saturation: 0.10, ..Default::default() })
                .split_tone([0.55, 0.50, 0.42], [0.56, 0.53, 0.45])
                .curve(&[(0.0, 0.03), (0.25, 0.24), (0.50, 0.53), (0.75, 0.78), (1.0, 0.97)]),
        }
    }
}

/// Writes every featured look into `dir`, returning the written paths.
pub fn write_featured(dir: &Path, size: usize) -> Result<Vec<std::path::PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(FeaturedLook::all().len());
    for look in FeaturedLook::all() {
        let path = dir.join(look.file_name());
        look.build(size).write(&path)?;
        tracing::info!(look = look.title(), path = %path.display(), "wrote featured LUT");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::cube::parse_cube;

    #[test]
    fn cube_text_layout() {
        let text = CubeBuilder::identity(2).titled("Id").to_cube_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "TITLE \"Id\"");
        assert_eq!(lines[1], "LUT_3D_SIZE 2");
        assert_eq!(lines[2], "DOMAIN_MIN 0.0 0.0 0.0");
        assert_eq!(lines[3], "DOMAIN_MAX 1.0 1.0 1.0");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "0.000000 0.000000 0.000000");
        // Red varies fastest
        assert_eq!(lines[6], "1.000000 0.000000 0.000000");
        assert_eq!(lines.len(), 5 + 8);
    }

    #[test]
    fn written_cubes_parse_back() {
        for look in FeaturedLook::all() {
            let builder = look.build(5);
            let parsed = parse_cube(&look.file_name(), &builder.to_cube_string()).unwrap();
            let built = builder.build().unwrap();
            assert_eq!(parsed.size(), 5);
            let max_err = parsed
                .data()
                .iter()
                .zip(built.data())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f32, f32::max);
            assert!(max_err <= 1e-6, "{}: {}", look.title(), max_err);
        }
    }

    #[test]
    fn featured_looks_stay_in_range_and_differ() {
        let vintage = FeaturedLook::Vintage.build(9).build().unwrap();
        let mood = FeaturedLook::Mood.build(9).build().unwrap();
        assert!(vintage.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_ne!(vintage, mood);
        // Matte blacks: pure black maps above zero
        assert!(vintage.sample([0.0, 0.0, 0.0])[0] > 0.04);
    }

    #[test]
    fn hsl_range_leaves_grays() {
        let gray = [0.4, 0.4, 0.4];
        let shifted = hsl_adjust_px(gray, (15.0, 45.0), HslShift { hue: 20.0, saturation: 0.5, luminance: 0.5 });
        assert_eq!(shifted, gray);
    }

    #[test]
    fn write_featured_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_featured(dir.path(), 3).unwrap();
        assert_eq!(paths.len(), 5);
        assert!(paths.iter().all(|p| p.is_file()));
    }
}
