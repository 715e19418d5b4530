//! Procedural sources. All of them are defined over the whole plane; callers materialize
//! them over a finite rect.

use crate::frame::{Frame, Rect};

#[inline]
fn fract(v: f32) -> f32 {
    v - v.floor()
}

/// 2D hash in [0, 1). Mirrors the `hash` function in the grain shader.
#[inline]
pub fn hash2(x: f32, y: f32) -> f32 {
    fract((x * 127.1 + y * 311.7).sin() * 43_758.547)
}

/// Value noise: hashed lattice corners blended with a smoothstep curve, in [0, 1).
pub fn value_noise(x: f32, y: f32) -> f32 {
    let ix = x.floor();
    let iy = y.floor();
    let fx = x - ix;
    let fy = y - iy;
    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);

    let a = hash2(ix, iy);
    let b = hash2(ix + 1.0, iy);
    let c = hash2(ix, iy + 1.0);
    let d = hash2(ix + 1.0, iy + 1.0);

    let top = a + (b - a) * ux;
    let bottom = c + (d - c) * ux;
    top + (bottom - top) * uy
}

/// Uncorrelated per-pixel noise in [0, 1), decorrelated by `seed`.
#[inline]
pub fn white_noise(x: f32, y: f32, seed: f32) -> f32 {
    hash2(x.floor() + seed * 0.618_034, y.floor() - seed * 1.414_213)
}

/// Midtone weighting used by grain: full strength at mid-gray, floored at 0.3 near black and white.
#[inline]
pub fn midtone_mask(luma: f32) -> f32 {
    (1.0 - (luma - 0.5).abs() * 2.0).max(0.3)
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Linear gradient from `c0` at `p0` to `c1` at `p1`, clamped beyond the endpoints.
pub fn linear_gradient(rect: Rect, p0: (f32, f32), c0: [f32; 4], p1: (f32, f32), c1: [f32; 4]) -> Frame {
    let dx = p1.0 - p0.0;
    let dy = p1.1 - p0.1;
    let len2 = (dx * dx + dy * dy).max(f32::EPSILON);
    Frame::generate(rect, |x, y| {
        let t = (((x - p0.0) * dx + (y - p0.1) * dy) / len2).clamp(0.0, 1.0);
        let mut out = [0.0; 4];
        for c in 0..4 {
            out[c] = c0[c] + (c1[c] - c0[c]) * t;
        }
        out
    })
}

/// Radial falloff from 0 at `inner` to 1 at `outer`, measured from `center`.
#[inline]
pub fn radial_mask(x: f32, y: f32, center: (f32, f32), inner: f32, outer: f32) -> f32 {
    let dx = x - center.0;
    let dy = y - center.1;
    smoothstep(inner, outer, (dx * dx + dy * dy).sqrt())
}
