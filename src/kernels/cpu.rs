use image::{ImageBuffer, Rgba32FImage};
use rayon::prelude::*;

use super::pool::{PoolKey, PoolStats, TexturePool, TexturePurpose};
use super::{blur_weights, BloomParams, GrainParams, KernelBackend, KernelParams, LightLeakParams};
use crate::errors::{FxError, Result};
use crate::frame::{luma, Frame};
use crate::ops::generators::{hash2, midtone_mask, smoothstep, value_noise};

/// Reference implementation of the kernels on the CPU. Produces the same math as the
/// compute shaders so tests and headless renders stay meaningful without an adapter.
pub struct CpuBackend {
    scratch: TexturePool<Vec<f32>>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self { scratch: TexturePool::new() }
    }

    fn buffer(&mut self, purpose: TexturePurpose, width: u32, height: u32) -> (PoolKey, Vec<f32>) {
        let key = PoolKey::new(purpose, width, height);
        let buf = self
            .scratch
            .acquire(key, |k| vec![0.0; k.width as usize * k.height as usize * 4]);
        (key, buf)
    }

    fn bloom(&mut self, params: &BloomParams, frame: &Frame) -> Result<Frame> {
        let (w, h) = (frame.width(), frame.height());
        let src = frame.pixels().as_raw();
        let (bright_key, mut bright) = self.buffer(TexturePurpose::BloomBright, w, h);
        let (scratch_key, mut scratch) = self.buffer(TexturePurpose::BloomScratch, w, h);

        bright_pass(src, &mut bright, params.threshold, params.knee);
        let weights = blur_weights(params.radius, params.sigma());
        blur_pass(&bright, &mut scratch, w, h, &weights, true);
        blur_pass(&scratch, &mut bright, w, h, &weights, false);

        let mut out = src.clone();
        out.par_chunks_mut(4).zip(bright.par_chunks(4)).for_each(|(px, glow)| {
            for c in 0..3 {
                px[c] = (px[c] + glow[c] * params.intensity).clamp(0.0, 1.0);
            }
        });

        self.scratch.release(bright_key, bright);
        self.scratch.release(scratch_key, scratch);
        rebuild(frame, out)
    }

    /// Per-pixel kernel staged in a pooled output buffer, like the shader's output texture.
    /// `f` receives local integer pixel coordinates.
    fn per_pixel<F>(&mut self, purpose: TexturePurpose, frame: &Frame, f: F) -> Result<Frame>
    where
        F: Fn(f32, f32, [f32; 4]) -> [f32; 4] + Sync,
    {
        let (w, h) = (frame.width(), frame.height());
        let src = frame.pixels().as_raw();
        let (key, mut staged) = self.buffer(purpose, w, h);
        let row_len = w as usize * 4;
        if row_len > 0 {
            staged
                .par_chunks_mut(row_len)
                .zip(src.par_chunks(row_len))
                .enumerate()
                .for_each(|(y, (dst, row))| {
                    for (x, (out, px)) in dst.chunks_exact_mut(4).zip(row.chunks_exact(4)).enumerate() {
                        out.copy_from_slice(&f(x as f32, y as f32, [px[0], px[1], px[2], px[3]]));
                    }
                });
        }
        let result = rebuild(frame, staged.clone());
        self.scratch.release(key, staged);
        result
    }

    fn grain(&mut self, params: &GrainParams, frame: &Frame) -> Result<Frame> {
        self.per_pixel(TexturePurpose::GrainOutput, frame, |x, y, px| {
            let n = grain_noise(x, y, params) * params.amplitude * midtone_mask(luma(&px));
            [
                (px[0] + n).clamp(0.0, 1.0),
                (px[1] + n).clamp(0.0, 1.0),
                (px[2] + n).clamp(0.0, 1.0),
                px[3],
            ]
        })
    }

    fn light_leak(&mut self, params: &LightLeakParams, frame: &Frame) -> Result<Frame> {
        let (w, h) = (frame.width(), frame.height());
        self.per_pixel(TexturePurpose::LightLeakOutput, frame, |x, y, px| {
            // Pixel centers
            let strength = leak_falloff(x + 0.5, y + 0.5, w, h, params) * params.opacity;
            let mut out = px;
            for c in 0..3 {
                let leak = (params.color[c] * strength).clamp(0.0, 1.0);
                out[c] = 1.0 - (1.0 - px[c]) * (1.0 - leak);
            }
            out
        })
    }
}

impl KernelBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn run(&mut self, params: &KernelParams, frame: &Frame) -> Result<Frame> {
        match params {
            KernelParams::Grain(p) => self.grain(p, frame),
            KernelParams::Bloom(p) => self.bloom(p, frame),
            KernelParams::LightLeak(p) => self.light_leak(p, frame),
        }
    }

    fn pool_stats(&self) -> PoolStats {
        self.scratch.stats()
    }

    fn clear_pool(&mut self) {
        self.scratch.clear();
    }
}

fn rebuild(like: &Frame, data: Vec<f32>) -> Result<Frame> {
    let (ox, oy) = like.origin();
    let pixels: Rgba32FImage = ImageBuffer::from_raw(like.width(), like.height(), data).ok_or(FxError::Gpu {
        message: "kernel output size mismatch".to_string(),
    })?;
    Ok(Frame::with_origin(pixels, ox, oy))
}

/// Grain noise at local pixel `(x, y)`, centered on zero, in [-1, 1).
pub fn grain_noise(x: f32, y: f32, params: &GrainParams) -> f32 {
    let cell = params.grain_size.max(0.5);
    let coarse = value_noise(x / cell + params.seed * 13.7, y / cell + params.seed * 7.3);
    let fine = hash2(x + params.seed, y - params.seed);
    (coarse * 0.7 + fine * 0.3) * 2.0 - 1.0
}

fn bright_pass(src: &[f32], dst: &mut [f32], threshold: f32, knee: f32) {
    dst.par_chunks_mut(4).zip(src.par_chunks(4)).for_each(|(out, px)| {
        let l = luma(&[px[0], px[1], px[2], px[3]]);
        let weight = smoothstep(threshold - knee, threshold + knee, l);
        out[0] = px[0] * weight;
        out[1] = px[1] * weight;
        out[2] = px[2] * weight;
        out[3] = px[3];
    });
}

/// One separable blur direction with edge-clamped taps.
fn blur_pass(src: &[f32], dst: &mut [f32], width: u32, height: u32, weights: &[f32], horizontal: bool) {
    let (w, h) = (width as i64, height as i64);
    let radius = weights.len() as i64 - 1;
    let row_len = width as usize * 4;
    dst.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for d in -radius..=radius {
                let weight = weights[d.unsigned_abs() as usize];
                let (sx, sy) = if horizontal {
                    ((x + d).clamp(0, w - 1), y)
                } else {
                    (x, (y + d).clamp(0, h - 1))
                };
                let base = ((sy * w + sx) * 4) as usize;
                for c in 0..4 {
                    acc[c] += src[base + c] * weight;
                }
            }
            let base = x as usize * 4;
            row[base..base + 4].copy_from_slice(&acc);
        }
    });
}

/// Radial falloff of the leak at local pixel `(x, y)`.
pub fn leak_falloff(x: f32, y: f32, width: u32, height: u32, params: &LightLeakParams) -> f32 {
    let cx = params.center.0 * width as f32;
    let cy = params.center.1 * height as f32;
    let reach = (params.radius * width.max(height) as f32).max(1.0);
    let dist = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() / reach;
    (1.0 - smoothstep(0.0, 1.0, dist)).powf(params.power)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rect;

    fn gray(w: u32, h: u32) -> Frame {
        Frame::solid(w, h, [0.5, 0.5, 0.5, 1.0])
    }

    #[test]
    fn grain_adds_variance_and_keeps_alpha() {
        let frame = gray(64, 64);
        let params = GrainParams::for_extent(1.0, Rect::new(0, 0, 2000, 2000), 3.0);
        let out = CpuBackend::new().run(&KernelParams::Grain(params), &frame).unwrap();
        assert_eq!(out.extent(), frame.extent());
        assert!(out.color_variance() > frame.color_variance() + 1e-4);
        assert!(out.pixels().pixels().all(|p| p[3] == 1.0));
    }

    #[test]
    fn bloom_brightens_around_highlights_only() {
        let frame = Frame::generate(Rect::new(0, 0, 48, 48), |x, y| {
            if (x - 24.0).abs() < 3.0 && (y - 24.0).abs() < 3.0 {
                [1.0, 1.0, 1.0, 1.0]
            } else {
                [0.1, 0.1, 0.1, 1.0]
            }
        });
        let mut backend = CpuBackend::new();
        let params = BloomParams { intensity: 1.0, threshold: 0.7, knee: 0.1, radius: 6 };
        let out = backend.run(&KernelParams::Bloom(params), &frame).unwrap();
        assert!(out.get(28, 24)[0] > 0.1 + 1e-3);
        assert!((out.get(0, 0)[0] - 0.1).abs() < 1e-5);

        // Second run reuses both intermediates
        backend.run(&KernelParams::Bloom(params), &frame).unwrap();
        let stats = backend.pool_stats();
        assert_eq!((stats.allocations, stats.hits), (2, 2));
    }

    #[test]
    fn per_pixel_kernels_reuse_their_output_buffers() {
        let frame = gray(16, 12);
        let mut backend = CpuBackend::new();
        let grain = KernelParams::Grain(GrainParams::for_extent(0.5, frame.extent(), 2.0));
        let leak = KernelParams::LightLeak(LightLeakParams::new(0.5));

        let first = backend.run(&grain, &frame).unwrap();
        let second = backend.run(&grain, &frame).unwrap();
        assert_eq!(first, second);
        backend.run(&leak, &frame).unwrap();
        backend.run(&leak, &frame).unwrap();

        let stats = backend.pool_stats();
        assert_eq!((stats.allocations, stats.hits), (2, 2));
        backend.run(&grain, &gray(8, 8)).unwrap();
        assert_eq!(backend.pool_stats().allocations, 3);
    }

    #[test]
    fn light_leak_screens_toward_center() {
        let frame = Frame::solid(100, 100, [0.2, 0.2, 0.2, 0.5]);
        let out = CpuBackend::new()
            .run(&KernelParams::LightLeak(LightLeakParams::new(1.0)), &frame)
            .unwrap();
        let near = out.get(85, 15);
        let far = out.get(0, 99);
        assert!(near[0] > far[0]);
        assert!(near[0] >= 0.2 && near[0] <= 1.0);
        assert_eq!(near[3], 0.5);
        assert!(out.pixels().pixels().all(|p| p[0] >= 0.2 - 1e-6));
    }

    #[test]
    fn origin_is_preserved() {
        let frame = gray(8, 8).translated(-4, 6);
        let out = CpuBackend::new()
            .run(&KernelParams::LightLeak(LightLeakParams::new(0.5)), &frame)
            .unwrap();
        assert_eq!(out.extent(), frame.extent());
    }
}
