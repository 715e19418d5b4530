//! Filter Graph Builder: turns an [`EditState`](crate::edit_state::EditState) into the fixed,
//! ordered stage chain and evaluates it.

mod builder;
mod overlays;
mod planner;

use std::fmt;

use crate::edit_state::{CropRect, SpatialEffect};
use crate::ops::looks::BuiltinLook;
use crate::ops::ColorControls;
use crate::presets::BatchedParams;

pub use builder::{FilterGraph, Rendered};
pub use overlays::OverlayStore;
pub use planner::{plan, prefix_key};

/// Every stage the chain can contain. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Rotation,
    Crop,
    Preset,
    ColorControls,
    Exposure,
    WhiteBalance,
    Vibrance,
    Sharpness,
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
    Overlay,
    Clamp,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Rotation => "rotation",
            StageKind::Crop => "crop",
            StageKind::Preset => "preset",
            StageKind::ColorControls => "color_controls",
            StageKind::Exposure => "exposure",
            StageKind::WhiteBalance => "white_balance",
            StageKind::Vibrance => "vibrance",
            StageKind::Sharpness => "sharpness",
            StageKind::Vignette => "vignette",
            StageKind::Bloom => "bloom",
            StageKind::Solarize => "solarize",
            StageKind::LightLeak => "light_leak",
            StageKind::Glitch => "glitch",
            StageKind::Fisheye => "fisheye",
            StageKind::Threshold => "threshold",
            StageKind::Grain => "grain",
            StageKind::ChromaticAberration => "chromatic_aberration",
            StageKind::Halation => "halation",
            StageKind::FilmBurn => "film_burn",
            StageKind::SoftDiffusion => "soft_diffusion",
            StageKind::Dust => "dust",
            StageKind::Letterbox => "letterbox",
            StageKind::Overlay => "overlay",
            StageKind::Clamp => "clamp",
        }
    }

    /// Rotation, crop and preset: the part of the chain that does not change while the
    /// basic sliders move.
    pub fn is_prefix(&self) -> bool {
        *self <= StageKind::Preset
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<SpatialEffect> for StageKind {
    fn from(effect: SpatialEffect) -> Self {
        match effect {
            SpatialEffect::Vignette => StageKind::Vignette,
            SpatialEffect::Bloom => StageKind::Bloom,
            SpatialEffect::Solarize => StageKind::Solarize,
            SpatialEffect::LightLeak => StageKind::LightLeak,
            SpatialEffect::Glitch => StageKind::Glitch,
            SpatialEffect::Fisheye => StageKind::Fisheye,
            SpatialEffect::Threshold => StageKind::Threshold,
            SpatialEffect::Grain => StageKind::Grain,
            SpatialEffect::ChromaticAberration => StageKind::ChromaticAberration,
            SpatialEffect::Halation => StageKind::Halation,
            SpatialEffect::FilmBurn => StageKind::FilmBurn,
            SpatialEffect::SoftDiffusion => StageKind::SoftDiffusion,
            SpatialEffect::Dust => StageKind::Dust,
            SpatialEffect::Letterbox => StageKind::Letterbox,
        }
    }
}

/// How the selected preset is realized.
#[derive(Debug, Clone, PartialEq)]
pub enum PresetStage {
    Lut {
        preset_id: String,
        file: String,
        intensity: f32,
    },
    Procedural {
        preset_id: String,
        look: BuiltinLook,
        params: BatchedParams,
        intensity: f32,
    },
    /// Selected id is not in the catalog
    Missing { preset_id: String },
}

/// One planned stage with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Rotation { degrees: f32 },
    Crop(CropRect),
    Preset(PresetStage),
    ColorControls(ColorControls),
    Exposure { ev: f32 },
    WhiteBalance { temperature: f32, tint: f32 },
    Vibrance { amount: f32 },
    Sharpness { amount: f32 },
    Effect { effect: SpatialEffect, intensity: f32 },
    Overlay { id: String, intensity: f32 },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Rotation { .. } => StageKind::Rotation,
            Stage::Crop(_) => StageKind::Crop,
            Stage::Preset(_) => StageKind::Preset,
            Stage::ColorControls(_) => StageKind::ColorControls,
            Stage::Exposure { .. } => StageKind::Exposure,
            Stage::WhiteBalance { .. } => StageKind::WhiteBalance,
            Stage::Vibrance { .. } => StageKind::Vibrance,
            Stage::Sharpness { .. } => StageKind::Sharpness,
            Stage::Effect { effect, .. } => StageKind::from(*effect),
            Stage::Overlay { .. } => StageKind::Overlay,
        }
    }
}
