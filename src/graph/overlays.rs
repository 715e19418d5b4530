use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::errors::{FxError, Result};
use crate::frame::{Frame, Rect};
use crate::ops::generators::{hash2, white_noise};

const OVERLAY_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const DUST_ID: &str = "dust";
const DUST_TEXTURE_SIZE: u32 = 512;

/// Overlay textures by id: registered in memory or loaded lazily from a directory as
/// `<id>.png` / `<id>.jpg`. Loaded textures are shared and never mutated.
pub struct OverlayStore {
    directory: Option<PathBuf>,
    textures: RwLock<HashMap<String, Arc<Frame>>>,
}

impl OverlayStore {
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory, textures: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, id: &str, texture: Frame) {
        if let Ok(mut textures) = self.textures.write() {
            textures.insert(id.to_string(), Arc::new(texture));
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<Frame>> {
        if let Some(texture) = self.textures.read().ok().and_then(|t| t.get(id).cloned()) {
            return Ok(texture);
        }
        let path = self.find_file(id).ok_or_else(|| FxError::AssetNotFound { name: id.to_string() })?;
        let image = image::open(&path).map_err(|e| {
            log::warn!("Failed to decode overlay {}: {}", path.display(), e);
            FxError::AssetNotFound { name: id.to_string() }
        })?;
        let texture = Arc::new(Frame::from_dynamic(&image));
        if let Ok(mut textures) = self.textures.write() {
            textures.insert(id.to_string(), Arc::clone(&texture));
        }
        tracing::debug!(overlay = id, path = %path.display(), "loaded overlay");
        Ok(texture)
    }

    fn find_file(&self, id: &str) -> Option<PathBuf> {
        let dir = self.directory.as_deref()?;
        if Path::new(id).file_name().and_then(|f| f.to_str()) != Some(id) {
            return None;
        }
        OVERLAY_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", id, ext)))
            .find(|p| p.is_file())
    }

    /// The dust texture: a registered or on-disk `dust` overlay, otherwise a generated
    /// speck field built once.
    pub fn dust_texture(&self) -> Arc<Frame> {
        if let Ok(texture) = self.get(DUST_ID) {
            return texture;
        }
        let texture = Arc::new(generate_dust(DUST_TEXTURE_SIZE));
        if let Ok(mut textures) = self.textures.write() {
            textures.entry(DUST_ID.to_string()).or_insert_with(|| Arc::clone(&texture));
        }
        texture
    }

    pub fn clear(&self) {
        if let Ok(mut textures) = self.textures.write() {
            textures.clear();
        }
    }
}

/// Sparse bright specks and short hairs on transparent black.
fn generate_dust(size: u32) -> Frame {
    Frame::generate(Rect::new(0, 0, size, size), |x, y| {
        let speck = white_noise(x, y, 7.0);
        let hair = hash2((x / 6.0).floor(), (y / 1.5).floor());
        let alpha = if speck > 0.9985 {
            1.0
        } else if hair > 0.9992 {
            0.6
        } else {
            0.0
        };
        [0.92, 0.9, 0.86, alpha]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_directory_once() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 128]));
        img.save(dir.path().join("paper.png")).unwrap();

        let store = OverlayStore::new(Some(dir.path().to_path_buf()));
        let first = store.get("paper").unwrap();
        std::fs::remove_file(dir.path().join("paper.png")).unwrap();
        let second = store.get("paper").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!((first.get(0, 0)[3] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn missing_and_escaping_ids_are_not_found() {
        let store = OverlayStore::new(None);
        assert!(matches!(store.get("paper"), Err(FxError::AssetNotFound { .. })));
        let store = OverlayStore::new(Some(std::env::temp_dir()));
        assert!(store.get("../etc/passwd").is_err());
    }

    #[test]
    fn dust_falls_back_to_generated_texture() {
        let store = OverlayStore::new(None);
        let dust = store.dust_texture();
        assert_eq!(dust.width(), DUST_TEXTURE_SIZE);
        assert!(dust.pixels().pixels().any(|p| p[3] > 0.0));
        assert!(Arc::ptr_eq(&dust, &store.dust_texture()));
    }
}
