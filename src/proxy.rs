//! Proxy Manager: bounded-resolution working copies for the interactive path.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::imageops::FilterType;

use crate::errors::{FxError, Result};
use crate::frame::Frame;

pub const DEFAULT_PROXY_MAX_DIMENSION: u32 = 1200;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// An immutable, materialized image with a process-unique identity. Render caches key
/// on the id, so a new load always gets a fresh one.
#[derive(Debug, Clone)]
pub struct SourceImage {
    id: u64,
    frame: Arc<Frame>,
}

impl SourceImage {
    pub fn new(frame: Frame) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            frame: Arc::new(frame.reanchored()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => FxError::from(io),
            other => {
                log::warn!("Failed to decode {}: {}", path.display(), other);
                FxError::UnsupportedFormat {
                    extension: path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_string(),
                }
            }
        })?;
        tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "loaded source");
        Ok(Self::new(Frame::from_dynamic(&image)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn shared_frame(&self) -> Arc<Frame> {
        Arc::clone(&self.frame)
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }
}

/// Size of the proxy for a `width` x `height` source, preserving aspect ratio.
pub fn proxy_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// `make_proxy(source)`: downscales with Lanczos3 when the longest side exceeds
/// `max_dimension`, materializing the pixels once. Smaller sources are shared as-is.
pub fn make_proxy(source: &SourceImage, max_dimension: u32) -> SourceImage {
    let (w, h) = proxy_dimensions(source.width(), source.height(), max_dimension);
    if (w, h) == (source.width(), source.height()) {
        return source.clone();
    }
    let start = std::time::Instant::now();
    let frame = source.frame().resized(w, h, FilterType::Lanczos3);
    tracing::debug!(
        from_width = source.width(),
        from_height = source.height(),
        width = w,
        height = h,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "proxy materialized"
    );
    SourceImage::new(frame)
}
