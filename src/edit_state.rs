use serde::{Deserialize, Serialize};

use crate::errors::{FxError, Result};
use crate::frame::Rect;

pub const NEUTRAL_TEMPERATURE: f32 = 6500.0;

/// Every user-adjustable parameter of one edit. The default value is the identity edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditState {
    pub preset_id: Option<String>,
    pub preset_intensity: f32, // 0.0 to 1.0

    pub brightness: f32,  // -1.0 to +1.0 (additive)
    pub contrast: f32,    // 0.25 to 4.0 (around 0.5)
    pub saturation: f32,  // 0.0 to 2.0
    pub exposure: f32,    // -3.0 to +3.0 (stops)
    pub sharpness: f32,   // 0.0 to 2.0
    pub vibrance: f32,    // -1.0 to +1.0
    pub temperature: f32, // 2000 to 10000 (Kelvin)
    pub tint: f32,        // -100 to +100 (green to magenta)

    #[serde(flatten)]
    pub effects: EffectIntensities,

    pub overlay_id: Option<String>,
    pub overlay_intensity: f32, // 0.0 to 1.0

    /// Normalized to the rotated image, so the same crop applies to proxy and full resolution
    pub crop: Option<CropRect>,
    pub rotation_degrees: f32,
}

impl Default for EditState {
    fn default() -> Self {
        Self {
            preset_id: None,
            preset_intensity: 1.0,
            brightness: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            exposure: 0.0,
            sharpness: 0.0,
            vibrance: 0.0,
            temperature: NEUTRAL_TEMPERATURE,
            tint: 0.0,
            effects: EffectIntensities::default(),
            overlay_id: None,
            overlay_intensity: 1.0,
            crop: None,
            rotation_degrees: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectIntensities {
    pub vignette: f32,
    pub bloom: f32,
    pub solarize: f32,
    pub light_leak: f32,
    pub glitch: f32,
    pub fisheye: f32,
    pub threshold: f32,
    pub grain: f32,
    pub chromatic_aberration: f32,
    pub halation: f32,
    pub film_burn: f32,
    pub soft_diffusion: f32,
    pub dust: f32,
    pub letterbox: f32,
}

/// Spatial effects in the order the graph applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialEffect {
    Vignette,
    Bloom,
    Solarize,
    LightLeak,
    Glitch,
    Fisheye,
    Threshold,
    Grain,
    ChromaticAberration,
    Halation,
    FilmBurn,
    SoftDiffusion,
    Dust,
    Letterbox,
}

impl SpatialEffect {
    pub const ALL: [SpatialEffect; 14] = [
        SpatialEffect::Vignette,
        SpatialEffect::Bloom,
        SpatialEffect::Solarize,
        SpatialEffect::LightLeak,
        SpatialEffect::Glitch,
        SpatialEffect::Fisheye,
        SpatialEffect::Threshold,
        SpatialEffect::Grain,
        SpatialEffect::ChromaticAberration,
        SpatialEffect::Halation,
        SpatialEffect::FilmBurn,
        SpatialEffect::SoftDiffusion,
        SpatialEffect::Dust,
        SpatialEffect::Letterbox,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpatialEffect::Vignette => "vignette",
            SpatialEffect::Bloom => "bloom",
            SpatialEffect::Solarize => "solarize",
            SpatialEffect::LightLeak => "light_leak",
            SpatialEffect::Glitch => "glitch",
            SpatialEffect::Fisheye => "fisheye",
            SpatialEffect::Threshold => "threshold",
            SpatialEffect::Grain => "grain",
            SpatialEffect::ChromaticAberration => "chromatic_aberration",
            SpatialEffect::Halation => "halation",
            SpatialEffect::FilmBurn => "film_burn",
            SpatialEffect::SoftDiffusion => "soft_diffusion",
            SpatialEffect::Dust => "dust",
            SpatialEffect::Letterbox => "letterbox",
        }
    }
}

impl EffectIntensities {
    pub fn get(&self, effect: SpatialEffect) -> f32 {
        match effect {
            SpatialEffect::Vignette => self.vignette,
            SpatialEffect::Bloom => self.bloom,
            SpatialEffect::Solarize => self.solarize,
            SpatialEffect::LightLeak => self.light_leak,
            SpatialEffect::Glitch => self.glitch,
            SpatialEffect::Fisheye => self.fisheye,
            SpatialEffect::Threshold => self.threshold,
            SpatialEffect::Grain => self.grain,
            SpatialEffect::ChromaticAberration => self.chromatic_aberration,
            SpatialEffect::Halation => self.halation,
            SpatialEffect::FilmBurn => self.film_burn,
            SpatialEffect::SoftDiffusion => self.soft_diffusion,
            SpatialEffect::Dust => self.dust,
            SpatialEffect::Letterbox => self.letterbox,
        }
    }

    pub fn set(&mut self, effect: SpatialEffect, value: f32) {
        let slot = match effect {
            SpatialEffect::Vignette => &mut self.vignette,
            SpatialEffect::Bloom => &mut self.bloom,
            SpatialEffect::Solarize => &mut self.solarize,
            SpatialEffect::LightLeak => &mut self.light_leak,
            SpatialEffect::Glitch => &mut self.glitch,
            SpatialEffect::Fisheye => &mut self.fisheye,
            SpatialEffect::Threshold => &mut self.threshold,
            SpatialEffect::Grain => &mut self.grain,
            SpatialEffect::ChromaticAberration => &mut self.chromatic_aberration,
            SpatialEffect::Halation => &mut self.halation,
            SpatialEffect::FilmBurn => &mut self.film_burn,
            SpatialEffect::SoftDiffusion => &mut self.soft_diffusion,
            SpatialEffect::Dust => &mut self.dust,
            SpatialEffect::Letterbox => &mut self.letterbox,
        };
        *slot = value;
    }

    /// Effects with a positive intensity, in application order.
    pub fn active(&self) -> impl Iterator<Item = (SpatialEffect, f32)> + '_ {
        SpatialEffect::ALL
            .into_iter()
            .map(|e| (e, self.get(e)))
            .filter(|(_, v)| *v > 0.0)
    }
}

/// Crop rectangle in normalized [0, 1] coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn is_full(&self) -> bool {
        self.x <= 0.0 && self.y <= 0.0 && self.x + self.width >= 1.0 && self.y + self.height >= 1.0
    }

    /// Maps the normalized rect into `extent`, clipped to it.
    pub fn to_pixels(&self, extent: Rect) -> Rect {
        let w = extent.width as f32;
        let h = extent.height as f32;
        let x0 = (self.x.clamp(0.0, 1.0) * w).round() as i32;
        let y0 = (self.y.clamp(0.0, 1.0) * h).round() as i32;
        let x1 = ((self.x + self.width).clamp(0.0, 1.0) * w).round() as i32;
        let y1 = ((self.y + self.height).clamp(0.0, 1.0) * h).round() as i32;
        Rect::new(
            extent.x + x0,
            extent.y + y0,
            (x1 - x0).max(0) as u32,
            (y1 - y0).max(0) as u32,
        )
    }
}

struct Range {
    name: &'static str,
    min: f32,
    max: f32,
}

const fn range(name: &'static str, min: f32, max: f32) -> Range {
    Range { name, min, max }
}

impl EditState {
    /// "Unedited" is defined as equality with the default state.
    pub fn is_unedited(&self) -> bool {
        *self == Self::default()
    }

    pub fn has_color_controls(&self) -> bool {
        self.brightness != 0.0 || self.contrast != 1.0 || self.saturation != 1.0
    }

    pub fn has_white_balance(&self) -> bool {
        self.temperature != NEUTRAL_TEMPERATURE || self.tint != 0.0
    }

    fn scalar_fields(&self) -> [(Range, f32); 11] {
        [
            (range("preset_intensity", 0.0, 1.0), self.preset_intensity),
            (range("brightness", -1.0, 1.0), self.brightness),
            (range("contrast", 0.25, 4.0), self.contrast),
            (range("saturation", 0.0, 2.0), self.saturation),
            (range("exposure", -3.0, 3.0), self.exposure),
            (range("sharpness", 0.0, 2.0), self.sharpness),
            (range("vibrance", -1.0, 1.0), self.vibrance),
            (range("temperature", 2000.0, 10000.0), self.temperature),
            (range("tint", -100.0, 100.0), self.tint),
            (range("overlay_intensity", 0.0, 1.0), self.overlay_intensity),
            (range("rotation_degrees", -360.0, 360.0), self.rotation_degrees),
        ]
    }

    /// Checks every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        for (r, value) in self.scalar_fields() {
            if !value.is_finite() || value < r.min || value > r.max {
                problems.push(format!("{} = {} (expected {}..={})", r.name, value, r.min, r.max));
            }
        }
        for effect in SpatialEffect::ALL {
            let value = self.effects.get(effect);
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                problems.push(format!("{} = {} (expected 0..=1)", effect.name(), value));
            }
        }
        if let Some(crop) = &self.crop {
            let fields = [crop.x, crop.y, crop.width, crop.height];
            if fields.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
                problems.push("crop must lie within the unit square".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(FxError::InvalidEditState { message: problems.join(", ") })
        }
    }

    /// Copy with every numeric field forced into its range. Non-finite values reset to neutral.
    pub fn clamped(&self) -> Self {
        let neutral = Self::default();
        let fix = |v: f32, n: f32, min: f32, max: f32| if v.is_finite() { v.clamp(min, max) } else { n };

        let mut out = self.clone();
        out.preset_intensity = fix(self.preset_intensity, neutral.preset_intensity, 0.0, 1.0);
        out.brightness = fix(self.brightness, 0.0, -1.0, 1.0);
        out.contrast = fix(self.contrast, 1.0, 0.25, 4.0);
        out.saturation = fix(self.saturation, 1.0, 0.0, 2.0);
        out.exposure = fix(self.exposure, 0.0, -3.0, 3.0);
        out.sharpness = fix(self.sharpness, 0.0, 0.0, 2.0);
        out.vibrance = fix(self.vibrance, 0.0, -1.0, 1.0);
        out.temperature = fix(self.temperature, NEUTRAL_TEMPERATURE, 2000.0, 10000.0);
        out.tint = fix(self.tint, 0.0, -100.0, 100.0);
        out.overlay_intensity = fix(self.overlay_intensity, 1.0, 0.0, 1.0);
        out.rotation_degrees = if self.rotation_degrees.is_finite() { self.rotation_degrees % 360.0 } else { 0.0 };
        for effect in SpatialEffect::ALL {
            out.effects.set(effect, fix(self.effects.get(effect), 0.0, 0.0, 1.0));
        }
        out.crop = self.crop.map(|c| {
            let x = fix(c.x, 0.0, 0.0, 1.0);
            let y = fix(c.y, 0.0, 0.0, 1.0);
            CropRect::new(x, y, fix(c.width, 1.0, 0.0, 1.0 - x), fix(c.height, 1.0, 0.0, 1.0 - y))
        });
        out
    }
}
