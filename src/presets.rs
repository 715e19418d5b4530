use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::ops::looks::BuiltinLook;
use crate::ops::ColorControls;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetTier {
    Free,
    Locked,
}

/// One declared parameter of a procedural preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PresetParam {
    Brightness(f32),
    Contrast(f32),
    Saturation(f32),
    Exposure(f32),
    Vibrance(f32),
    Temperature(f32),
    /// Black lift, 0.0 to 0.2
    Fade(f32),
}

/// A LUT file or a built-in look plus parameters, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresetLook {
    Lut { file: String },
    Procedural { builtin: BuiltinLook, params: Vec<PresetParam> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tier: PresetTier,
    pub look: PresetLook,
    #[serde(default = "default_intensity")]
    pub default_intensity: f32,
}

fn default_intensity() -> f32 {
    1.0
}

/// Declared procedural parameters folded so each kind of adjustment is applied once.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchedParams {
    pub controls: ColorControls,
    pub exposure: f32,
    pub vibrance: f32,
    pub temperature: Option<f32>,
    pub fade: f32,
}

impl BatchedParams {
    /// Later declarations of the same kind win; brightness, contrast and saturation
    /// always travel together.
    pub fn from_params(params: &[PresetParam]) -> Self {
        let mut out = Self::default();
        for param in params {
            match *param {
                PresetParam::Brightness(v) => out.controls.brightness = v,
                PresetParam::Contrast(v) => out.controls.contrast = v,
                PresetParam::Saturation(v) => out.controls.saturation = v,
                PresetParam::Exposure(v) => out.exposure = v,
                PresetParam::Vibrance(v) => out.vibrance = v,
                PresetParam::Temperature(v) => out.temperature = Some(v),
                PresetParam::Fade(v) => out.fade = v,
            }
        }
        out
    }
}

impl Preset {
    fn lut(id: &str, name: &str, description: &str, tier: PresetTier) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            tier,
            look: PresetLook::Lut { file: format!("{}.cube", id) },
            default_intensity: 1.0,
        }
    }

    fn procedural(
        id: &str,
        name: &str,
        description: &str,
        builtin: BuiltinLook,
        params: Vec<PresetParam>,
        default_intensity: f32,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            tier: PresetTier::Free,
            look: PresetLook::Procedural { builtin, params },
            default_intensity,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.tier == PresetTier::Locked
    }

    pub fn lut_file(&self) -> Option<&str> {
        match &self.look {
            PresetLook::Lut { file } => Some(file),
            PresetLook::Procedural { .. } => None,
        }
    }
}

/// Read-only preset data, loaded once per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetCatalog {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    pub fn builtin() -> Self {
        use PresetParam::*;
        Self::new(vec![
            Preset::lut("ft_vintage", "Vintage", "Retro warm earth tones with matte blacks", PresetTier::Free),
            Preset::lut("ft_mood", "Mood", "Editorial, desaturated, muted greens and blues", PresetTier::Free),
            Preset::lut("ft_lush", "Lush", "Warm, vibrant summer color with cyan blues", PresetTier::Locked),
            Preset::lut("ft_dream", "Dream", "Soft pastel glow with lifted shadows", PresetTier::Locked),
            Preset::lut("ft_golden", "Golden Hour", "Warm sunlight and amber tones", PresetTier::Locked),
            Preset::procedural(
                "mono",
                "Mono",
                "Clean black and white",
                BuiltinLook::Mono,
                vec![Contrast(1.1)],
                1.0,
            ),
            Preset::procedural(
                "noir",
                "Noir",
                "High contrast black and white",
                BuiltinLook::Noir,
                vec![Contrast(1.25), Brightness(-0.03)],
                1.0,
            ),
            Preset::procedural(
                "faded",
                "Faded",
                "Washed film with soft blacks",
                BuiltinLook::Fade,
                vec![Saturation(0.85), Fade(0.06)],
                0.8,
            ),
            Preset::procedural(
                "chrome",
                "Chrome",
                "Punchy slide film color",
                BuiltinLook::Chrome,
                vec![Contrast(1.15), Saturation(1.2), Vibrance(0.1)],
                0.9,
            ),
            Preset::procedural(
                "instant",
                "Instant",
                "Warm instant film",
                BuiltinLook::Instant,
                vec![Temperature(7200.0), Exposure(0.15), Saturation(0.9)],
                0.85,
            ),
            Preset::procedural(
                "process",
                "Process",
                "Cross-processed cool shadows",
                BuiltinLook::Process,
                vec![Contrast(1.05)],
                1.0,
            ),
            Preset::procedural(
                "sepia",
                "Sepia",
                "Antique brown toning",
                BuiltinLook::Sepia,
                vec![Brightness(0.02), Contrast(0.95)],
                0.9,
            ),
        ])
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Preset] {
        &self.presets
    }

    pub fn free(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter().filter(|p| !p.is_locked())
    }

    /// LUT filenames referenced by the catalog, in catalog order.
    pub fn lut_files(&self) -> Vec<&str> {
        self.presets.iter().filter_map(|p| p.lut_file()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_featured_luts() {
        let catalog = PresetCatalog::builtin();
        assert_eq!(
            catalog.lut_files(),
            vec!["ft_vintage.cube", "ft_mood.cube", "ft_lush.cube", "ft_dream.cube", "ft_golden.cube"]
        );
        assert_eq!(catalog.get("ft_golden").unwrap().name, "Golden Hour");
        assert!(catalog.get("ft_lush").unwrap().is_locked());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn params_are_batched() {
        let batched = BatchedParams::from_params(&[
            PresetParam::Contrast(1.2),
            PresetParam::Saturation(0.5),
            PresetParam::Brightness(0.1),
            PresetParam::Contrast(1.3),
        ]);
        assert_eq!(batched.controls, ColorControls { brightness: 0.1, contrast: 1.3, saturation: 0.5 });
        assert_eq!(batched.temperature, None);
    }

    #[test]
    fn catalog_json_round_trip() {
        let catalog = PresetCatalog::builtin();
        let json = serde_json::to_string(&catalog).unwrap();
        assert_eq!(PresetCatalog::from_json(&json).unwrap(), catalog);

        let custom = PresetCatalog::from_json(
            r#"{ "presets": [ { "id": "x", "name": "X", "tier": "free",
                 "look": { "type": "procedural", "builtin": "lomo", "params": [ { "kind": "contrast", "value": 1.4 } ] } } ] }"#,
        )
        .unwrap();
        let preset = custom.get("x").unwrap();
        assert_eq!(preset.default_intensity, 1.0);
        assert!(matches!(
            &preset.look,
            PresetLook::Procedural { builtin: BuiltinLook::Unsupported(name), .. } if name == "lomo"
        ));
    }
}
