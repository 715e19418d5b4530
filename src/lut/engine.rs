use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::cache::{LutCache, LutCacheStats};
use super::cube::{parse_cube, LutBuffer};
use crate::errors::{FxError, Result};
use crate::frame::Frame;
use crate::ops::blend::dissolve;

/// Resolves cube files by name, caches parsed buffers and applies them.
pub struct LutEngine {
    directory: Option<PathBuf>,
    bundled: RwLock<HashMap<String, Arc<str>>>,
    cache: LutCache,
}

impl LutEngine {
    pub fn new(directory: Option<PathBuf>, cache_capacity: usize) -> Self {
        Self {
            directory,
            bundled: RwLock::new(HashMap::new()),
            cache: LutCache::new(cache_capacity),
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Registers cube text under `name`, taking precedence over the directory.
    pub fn register_bundled(&self, name: &str, text: impl Into<Arc<str>>) {
        if let Ok(mut bundled) = self.bundled.write() {
            bundled.insert(name.to_string(), text.into());
        }
    }

    fn read_source(&self, name: &str) -> Result<Arc<str>> {
        if let Some(text) = self.bundled.read().ok().and_then(|b| b.get(name).cloned()) {
            return Ok(text);
        }

        let dir = self
            .directory
            .as_ref()
            .ok_or_else(|| FxError::AssetNotFound { name: name.to_string() })?;
        // Bare file names only; nothing may escape the LUT directory
        let file_name = Path::new(name)
            .file_name()
            .filter(|f| f.to_str() == Some(name))
            .ok_or_else(|| FxError::AssetNotFound { name: name.to_string() })?;
        let path = dir.join(file_name);
        if !path.is_file() {
            return Err(FxError::AssetNotFound { name: name.to_string() });
        }
        Ok(Arc::from(std::fs::read_to_string(&path)?))
    }

    /// Parsed cube for `name`, from cache or freshly parsed. Invalid files are never cached.
    pub fn resolve(&self, name: &str) -> Result<Arc<LutBuffer>> {
        if let Some(lut) = self.cache.get(name) {
            return Ok(lut);
        }
        let text = self.read_source(name)?;
        let lut = Arc::new(parse_cube(name, &text)?);
        self.cache.insert(name, Arc::clone(&lut));
        tracing::debug!(lut = name, size = lut.size(), "parsed LUT");
        Ok(lut)
    }

    /// Grades `frame` with the named cube, dissolved toward the input when `intensity` < 1.
    /// Never fails: any lookup or parse problem returns the input unchanged.
    pub fn apply_lut(&self, name: &str, frame: &Frame, intensity: f32) -> Frame {
        if intensity <= 0.0 {
            return frame.clone();
        }
        match self.resolve(name) {
            Ok(lut) => Self::apply_resolved(&lut, frame, intensity),
            Err(e) => {
                e.log_degraded("lut");
                frame.clone()
            }
        }
    }

    /// Grades `frame` with an already resolved cube.
    pub fn apply_resolved(lut: &LutBuffer, frame: &Frame, intensity: f32) -> Frame {
        if intensity <= 0.0 {
            return frame.clone();
        }
        let graded = frame.map_pixels(|px| lut.apply_px(px));
        if intensity < 1.0 {
            dissolve(frame, &graded, intensity)
        } else {
            graded
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> LutCacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::authoring::CubeBuilder;

    fn gradient() -> Frame {
        Frame::generate(crate::frame::Rect::new(0, 0, 16, 16), |x, y| {
            [x / 16.0, y / 16.0, (x + y) / 32.0, 1.0]
        })
    }

    #[test]
    fn identity_cube_is_a_no_op() {
        let engine = LutEngine::new(None, 4);
        engine.register_bundled("identity.cube", CubeBuilder::identity(2).to_cube_string());
        let frame = gradient();
        let out = engine.apply_lut("identity.cube", &frame, 1.0);
        assert!(out.max_abs_diff(&frame) < 1e-5);
    }

    #[test]
    fn malformed_file_returns_input_and_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.cube"), "LUT_3D_SIZE 2\n0 0 0\n1 1 1\n").unwrap();
        let engine = LutEngine::new(Some(dir.path().to_path_buf()), 4);

        let frame = gradient();
        assert_eq!(engine.apply_lut("broken.cube", &frame, 1.0), frame);
        assert_eq!(engine.cache_stats().entries, 0);
        assert_eq!(engine.apply_lut("missing.cube", &frame, 1.0), frame);
        assert_eq!(engine.apply_lut("../broken.cube", &frame, 1.0), frame);
    }

    #[test]
    fn files_are_cached_by_name() {
        let dir = tempfile::tempdir().unwrap();
        CubeBuilder::identity(3).exposure(0.5).write(&dir.path().join("bright.cube")).unwrap();
        let engine = LutEngine::new(Some(dir.path().to_path_buf()), 4);

        let frame = Frame::solid(4, 4, [0.25, 0.25, 0.25, 1.0]);
        let first = engine.apply_lut("bright.cube", &frame, 1.0);
        let second = engine.apply_lut("bright.cube", &frame, 1.0);
        assert_eq!(first, second);
        assert!(first.get(0, 0)[0] > 0.3);
        let stats = engine.cache_stats();
        assert_eq!((stats.entries, stats.hits), (1, 1));
    }

    #[test]
    fn partial_intensity_dissolves() {
        let engine = LutEngine::new(None, 4);
        engine.register_bundled("dark.cube", CubeBuilder::identity(2).exposure(-1.0).to_cube_string());
        let frame = Frame::solid(2, 2, [0.8, 0.8, 0.8, 1.0]);
        let full = engine.apply_lut("dark.cube", &frame, 1.0).get(0, 0)[0];
        let half = engine.apply_lut("dark.cube", &frame, 0.5).get(0, 0)[0];
        assert!((half - (0.8 + full) / 2.0).abs() < 1e-5);
        assert_eq!(engine.apply_lut("dark.cube", &frame, 0.0), frame);
    }
}
