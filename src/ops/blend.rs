use crate::frame::Frame;

/// Linear mix from `base` (t = 0) to `top` (t = 1) over `base`'s extent, alpha included.
pub fn dissolve(base: &Frame, top: &Frame, t: f32) -> Frame {
    let t = t.clamp(0.0, 1.0);
    if t == 0.0 {
        return base.clone();
    }
    base.zip_with(top, |b, f| {
        [
            b[0] + (f[0] - b[0]) * t,
            b[1] + (f[1] - b[1]) * t,
            b[2] + (f[2] - b[2]) * t,
            b[3] + (f[3] - b[3]) * t,
        ]
    })
}

#[inline]
pub fn screen_px(base: f32, layer: f32) -> f32 {
    1.0 - (1.0 - base) * (1.0 - layer)
}

/// Screen blend of `layer` onto `base`, weighted by the layer's alpha. Base alpha is kept.
pub fn screen(base: &Frame, layer: &Frame) -> Frame {
    base.zip_with(layer, |b, l| {
        let a = l[3].clamp(0.0, 1.0);
        let mut out = b;
        for c in 0..3 {
            let s = screen_px(b[c].clamp(0.0, 1.0), l[c].clamp(0.0, 1.0));
            out[c] = b[c] + (s - b[c]) * a;
        }
        out
    })
}

/// Porter-Duff source-over with straight alpha.
pub fn source_over(base: &Frame, over: &Frame) -> Frame {
    base.zip_with(over, |b, o| {
        let ao = o[3].clamp(0.0, 1.0);
        let ab = b[3].clamp(0.0, 1.0);
        let out_a = ao + ab * (1.0 - ao);
        if out_a <= f32::EPSILON {
            return [0.0; 4];
        }
        let mut out = [0.0, 0.0, 0.0, out_a];
        for c in 0..3 {
            out[c] = (o[c] * ao + b[c] * ab * (1.0 - ao)) / out_a;
        }
        out
    })
}

/// Scales alpha by `factor`.
pub fn with_opacity(frame: &Frame, factor: f32) -> Frame {
    frame.map_pixels(|px| [px[0], px[1], px[2], px[3] * factor])
}
