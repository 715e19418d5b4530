use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{FxError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // Interactive path
    pub proxy_max_dimension: u32,
    pub interactive_cache_entries: usize,

    // Color grading
    pub lut_cache_capacity: usize,
    pub lut_directory: Option<PathBuf>,

    // Assets
    pub overlay_directory: Option<PathBuf>,
    /// Target aspect ratio of the letterbox effect (width / height)
    pub letterbox_aspect: f32,

    // Compute kernels
    pub kernel_backend: KernelBackendChoice,

    // Export
    pub export_format: ExportFormat,
    pub jpeg_quality: u8,

    pub enable_debug_logging: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            proxy_max_dimension: 1200,
            interactive_cache_entries: 8,
            lut_cache_capacity: 20,
            lut_directory: None,
            overlay_directory: None,
            letterbox_aspect: 2.39,
            kernel_backend: KernelBackendChoice::Auto,
            export_format: ExportFormat::Jpeg,
            jpeg_quality: 92,
            enable_debug_logging: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KernelBackendChoice {
    /// GPU when an adapter is available, CPU otherwise
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl std::str::FromStr for KernelBackendChoice {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(FxError::Settings {
                message: format!("unknown kernel backend '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Png => "png",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "png" => Some(ExportFormat::Png),
            _ => None,
        }
    }
}

impl EngineSettings {
    fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "lume", "LumeFx")
            .map(|proj_dirs| proj_dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from the platform config dir, falling back to defaults.
    pub fn load() -> Self {
        if let Some(config_path) = Self::config_path() {
            if config_path.exists() {
                match Self::load_from(&config_path) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring unreadable settings {}: {}", config_path.display(), e),
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        if let Some(config_path) = Self::config_path() {
            if let Err(e) = self.save_to(&config_path) {
                log::warn!("Failed to save settings: {}", e);
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validated()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validated(self) -> Result<Self> {
        if self.proxy_max_dimension == 0 {
            return Err(FxError::Settings { message: "proxy_max_dimension must be positive".into() });
        }
        if self.lut_cache_capacity == 0 {
            return Err(FxError::Settings { message: "lut_cache_capacity must be positive".into() });
        }
        if !(self.letterbox_aspect.is_finite() && self.letterbox_aspect > 0.0) {
            return Err(FxError::Settings { message: "letterbox_aspect must be a positive ratio".into() });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "kernel_backend": "cpu", "lut_cache_capacity": 4 }"#).unwrap();

        let settings = EngineSettings::load_from(&path).unwrap();
        assert_eq!(settings.kernel_backend, KernelBackendChoice::Cpu);
        assert_eq!(settings.lut_cache_capacity, 4);
        assert_eq!(settings.proxy_max_dimension, 1200);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = EngineSettings {
            export_format: ExportFormat::Png,
            lut_directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(EngineSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn rejects_zero_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "lut_cache_capacity": 0 }"#).unwrap();
        assert!(matches!(EngineSettings::load_from(&path), Err(FxError::Settings { .. })));
    }

    #[test]
    fn export_format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a/b.JPEG")), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_path(Path::new("b.png")), Some(ExportFormat::Png));
        assert_eq!(ExportFormat::from_path(Path::new("b.gif")), None);
    }
}
