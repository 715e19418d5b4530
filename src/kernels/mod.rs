//! Compute Kernel Service: grain, multi-pass bloom and light-leak kernels behind one
//! contract, with a GPU (wgpu) and a CPU (rayon) implementation of the same math.

pub mod cpu;
pub mod gpu;
pub mod pool;

use std::fmt;

use crate::errors::{FxError, Result};
use crate::frame::{Frame, Rect};

pub use pool::{PoolKey, PoolStats, TexturePool, TexturePurpose};

/// Grain amplitude at full intensity for a 2000px image.
pub const GRAIN_STRENGTH: f32 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Grain,
    Bloom,
    LightLeak,
}

impl KernelKind {
    pub fn name(&self) -> &'static str {
        match self {
            KernelKind::Grain => "grain",
            KernelKind::Bloom => "bloom",
            KernelKind::LightLeak => "light_leak",
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainParams {
    /// Noise amplitude, already scaled for resolution
    pub amplitude: f32,
    /// Lattice cell size in pixels
    pub grain_size: f32,
    pub seed: f32,
}

impl GrainParams {
    /// Scales `intensity` by `max_dimension / 2000` so a setting reads the same on a proxy
    /// and on the full-resolution export.
    pub fn for_extent(intensity: f32, extent: Rect, seed: f32) -> Self {
        let resolution_scale = extent.max_dimension() as f32 / 2000.0;
        Self {
            amplitude: intensity * GRAIN_STRENGTH * resolution_scale,
            grain_size: 1.5,
            seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    pub intensity: f32,
    /// Luminance where the bright pass is halfway up its ramp
    pub threshold: f32,
    pub knee: f32,
    /// Blur radius in pixels
    pub radius: u32,
}

impl BloomParams {
    pub fn for_extent(intensity: f32, extent: Rect) -> Self {
        let radius = (extent.max_dimension() as f32 * 0.015).round().clamp(2.0, 48.0) as u32;
        Self { intensity, threshold: 0.7, knee: 0.1, radius }
    }

    pub fn sigma(&self) -> f32 {
        (self.radius as f32 * 0.5).max(0.5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightLeakParams {
    /// Leak origin in normalized coordinates of the image
    pub center: (f32, f32),
    /// Reach as a fraction of the longest side
    pub radius: f32,
    pub color: [f32; 3],
    pub opacity: f32,
    pub power: f32,
}

impl LightLeakParams {
    pub fn new(opacity: f32) -> Self {
        Self {
            center: (0.85, 0.15),
            radius: 0.75,
            color: [1.0, 0.5, 0.2],
            opacity,
            power: 1.5,
        }
    }
}

/// Kernel selection and its typed parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParams {
    Grain(GrainParams),
    Bloom(BloomParams),
    LightLeak(LightLeakParams),
}

impl KernelParams {
    pub fn kind(&self) -> KernelKind {
        match self {
            KernelParams::Grain(_) => KernelKind::Grain,
            KernelParams::Bloom(_) => KernelKind::Bloom,
            KernelParams::LightLeak(_) => KernelKind::LightLeak,
        }
    }
}

/// One implementation of the kernel contract. Implementations own their pool and pipeline
/// state and are driven from a single worker.
pub trait KernelBackend: Send {
    fn name(&self) -> &'static str;

    /// Runs one kernel synchronously; the result keeps the input's extent.
    fn run(&mut self, params: &KernelParams, frame: &Frame) -> Result<Frame>;

    fn pool_stats(&self) -> PoolStats;

    fn clear_pool(&mut self);
}

pub struct ComputeKernelService {
    backend: Option<Box<dyn KernelBackend>>,
}

impl ComputeKernelService {
    pub fn new(backend: Box<dyn KernelBackend>) -> Self {
        Self { backend: Some(backend) }
    }

    pub fn cpu() -> Self {
        Self::new(Box::new(cpu::CpuBackend::new()))
    }

    /// A service whose kernels all report unavailable.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("none")
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// `apply_kernel(kind, image, params)`: the kind travels inside `params`.
    pub fn apply_kernel(&mut self, params: &KernelParams, frame: &Frame) -> Result<Frame> {
        let kind = params.kind();
        let backend = self.backend.as_mut().ok_or_else(|| FxError::KernelUnavailable {
            kernel: kind.name(),
            message: "no kernel backend".to_string(),
        })?;
        if frame.extent().is_empty() {
            return Ok(frame.clone());
        }
        let start = std::time::Instant::now();
        let out = backend.run(params, frame)?;
        tracing::trace!(
            kernel = kind.name(),
            backend = backend.name(),
            width = frame.width(),
            height = frame.height(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "kernel done"
        );
        Ok(out)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.backend.as_ref().map(|b| b.pool_stats()).unwrap_or_default()
    }

    pub fn clear_pool(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.clear_pool();
        }
    }
}

/// Normalized Gaussian-like weights for taps `0..=radius`; tap `i` is used on both sides.
pub fn blur_weights(radius: u32, sigma: f32) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (0..=radius).map(|i| (-((i * i) as f32) / two_sigma2).exp()).collect();
    let total: f32 = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_service_reports_kernel() {
        let mut service = ComputeKernelService::unavailable();
        let frame = Frame::solid(4, 4, [0.5; 4]);
        let err = service
            .apply_kernel(&KernelParams::Bloom(BloomParams::for_extent(1.0, frame.extent())), &frame)
            .unwrap_err();
        assert!(matches!(err, FxError::KernelUnavailable { kernel: "bloom", .. }));
    }

    #[test]
    fn grain_amplitude_scales_with_resolution() {
        let proxy = GrainParams::for_extent(0.5, Rect::new(0, 0, 1200, 800), 1.0);
        let full = GrainParams::for_extent(0.5, Rect::new(0, 0, 4000, 3000), 1.0);
        assert!((proxy.amplitude - 0.5 * GRAIN_STRENGTH * 0.6).abs() < 1e-6);
        assert!((full.amplitude / proxy.amplitude - 4000.0 / 1200.0).abs() < 1e-4);
    }

    #[test]
    fn blur_weights_sum_to_one() {
        let w = blur_weights(8, 4.0);
        let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(w.windows(2).all(|p| p[0] >= p[1]));
    }
}
