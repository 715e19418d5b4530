use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{PresetStage, Stage};
use crate::edit_state::EditState;
use crate::ops::geometry::normalize_degrees;
use crate::ops::ColorControls;
use crate::presets::{BatchedParams, PresetCatalog, PresetLook};

/// Builds the ordered stage list for `state`. Identity stages are left out entirely, so
/// the default state plans to an empty chain.
pub fn plan(state: &EditState, presets: &PresetCatalog) -> Vec<Stage> {
    let mut stages = Vec::new();

    let degrees = normalize_degrees(state.rotation_degrees);
    if degrees != 0.0 {
        stages.push(Stage::Rotation { degrees });
    }
    if let Some(crop) = state.crop.filter(|c| !c.is_empty() && !c.is_full()) {
        stages.push(Stage::Crop(crop));
    }

    if let Some(preset_id) = state.preset_id.as_deref() {
        if state.preset_intensity > 0.0 {
            stages.push(Stage::Preset(preset_stage(preset_id, state.preset_intensity, presets)));
        }
    }

    let controls = ColorControls {
        brightness: state.brightness,
        contrast: state.contrast,
        saturation: state.saturation,
    };
    if !controls.is_identity() {
        stages.push(Stage::ColorControls(controls));
    }
    if state.exposure != 0.0 {
        stages.push(Stage::Exposure { ev: state.exposure });
    }
    if state.has_white_balance() {
        stages.push(Stage::WhiteBalance { temperature: state.temperature, tint: state.tint });
    }
    if state.vibrance != 0.0 {
        stages.push(Stage::Vibrance { amount: state.vibrance });
    }
    if state.sharpness > 0.0 {
        stages.push(Stage::Sharpness { amount: state.sharpness });
    }

    for (effect, intensity) in state.effects.active() {
        stages.push(Stage::Effect { effect, intensity });
    }

    if let Some(id) = state.overlay_id.as_deref() {
        if state.overlay_intensity > 0.0 {
            stages.push(Stage::Overlay { id: id.to_string(), intensity: state.overlay_intensity });
        }
    }

    stages
}

fn preset_stage(preset_id: &str, intensity: f32, presets: &PresetCatalog) -> PresetStage {
    let intensity = intensity.min(1.0);
    match presets.get(preset_id).map(|p| &p.look) {
        Some(PresetLook::Lut { file }) => PresetStage::Lut {
            preset_id: preset_id.to_string(),
            file: file.clone(),
            intensity,
        },
        Some(PresetLook::Procedural { builtin, params }) => PresetStage::Procedural {
            preset_id: preset_id.to_string(),
            look: builtin.clone(),
            params: BatchedParams::from_params(params),
            intensity,
        },
        None => PresetStage::Missing { preset_id: preset_id.to_string() },
    }
}

/// Cache key for the rotation, crop and preset prefix of a render of `source_id`.
pub fn prefix_key(source_id: u64, state: &EditState) -> u64 {
    let mut hasher = DefaultHasher::new();
    source_id.hash(&mut hasher);
    normalize_degrees(state.rotation_degrees).to_bits().hash(&mut hasher);
    if let Some(crop) = &state.crop {
        for v in [crop.x, crop.y, crop.width, crop.height] {
            v.to_bits().hash(&mut hasher);
        }
    }
    state.preset_id.hash(&mut hasher);
    if state.preset_id.is_some() {
        state.preset_intensity.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit_state::{CropRect, SpatialEffect};
    use crate::graph::StageKind;

    #[test]
    fn default_state_plans_nothing() {
        assert!(plan(&EditState::default(), &PresetCatalog::builtin()).is_empty());
    }

    #[test]
    fn stages_follow_fixed_order() {
        let mut state = EditState {
            rotation_degrees: 90.0,
            crop: Some(CropRect::new(0.1, 0.1, 0.5, 0.5)),
            preset_id: Some("mono".to_string()),
            brightness: 0.1,
            exposure: 0.5,
            sharpness: 0.5,
            overlay_id: Some("paper".to_string()),
            ..Default::default()
        };
        state.effects.letterbox = 1.0;
        state.effects.vignette = 0.3;
        state.effects.grain = 0.2;

        let kinds: Vec<StageKind> = plan(&state, &PresetCatalog::builtin()).iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Rotation,
                StageKind::Crop,
                StageKind::Preset,
                StageKind::ColorControls,
                StageKind::Exposure,
                StageKind::Sharpness,
                StageKind::Vignette,
                StageKind::Grain,
                StageKind::Letterbox,
                StageKind::Overlay,
            ]
        );
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
    }

    #[test]
    fn brightness_contrast_saturation_travel_together() {
        let state = EditState { contrast: 1.2, saturation: 0.5, ..Default::default() };
        let stages = plan(&state, &PresetCatalog::builtin());
        assert_eq!(
            stages,
            vec![Stage::ColorControls(ColorControls { brightness: 0.0, contrast: 1.2, saturation: 0.5 })]
        );
    }

    #[test]
    fn degenerate_inputs_are_skipped() {
        let state = EditState {
            rotation_degrees: 360.0,
            crop: Some(CropRect::new(0.0, 0.0, 1.0, 1.0)),
            preset_id: Some("mono".to_string()),
            preset_intensity: 0.0,
            overlay_id: Some("paper".to_string()),
            overlay_intensity: 0.0,
            ..Default::default()
        };
        assert!(plan(&state, &PresetCatalog::builtin()).is_empty());
    }

    #[test]
    fn unknown_preset_is_planned_as_missing() {
        let state = EditState { preset_id: Some("nope".to_string()), ..Default::default() };
        assert_eq!(
            plan(&state, &PresetCatalog::builtin()),
            vec![Stage::Preset(PresetStage::Missing { preset_id: "nope".to_string() })]
        );
    }

    #[test]
    fn prefix_key_ignores_slider_stages() {
        let base = EditState { preset_id: Some("mono".to_string()), ..Default::default() };
        let mut slid = base.clone();
        slid.brightness = 0.4;
        slid.effects.set(SpatialEffect::Grain, 0.5);
        assert_eq!(prefix_key(1, &base), prefix_key(1, &slid));
        assert_ne!(prefix_key(1, &base), prefix_key(2, &base));

        let rotated = EditState { rotation_degrees: 10.0, ..base.clone() };
        assert_ne!(prefix_key(1, &base), prefix_key(1, &rotated));
    }
}
