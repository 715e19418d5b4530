use crate::frame::{Frame, Rect};

/// Radial bump around the extent center. Positive `scale` magnifies the middle.
pub fn bump_distortion(frame: &Frame, radius: f32, scale: f32) -> Frame {
    if radius <= 0.0 || scale == 0.0 {
        return frame.clone();
    }
    let (cx, cy) = frame.extent().center();
    frame.map_pixels_xy(|x, y, px| {
        let dx = x - cx;
        let dy = y - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= radius {
            return px;
        }
        let t = dist / radius;
        let factor = (1.0 - scale * (1.0 - t * t)).max(0.0);
        frame.sample_bilinear(cx + dx * factor, cy + dy * factor)
    })
}

/// Splits the color channels, shifts red and blue independently, and recombines them
/// additively. The result covers the union of the shifted extents.
pub fn channel_split(frame: &Frame, red_offset: (i32, i32), blue_offset: (i32, i32)) -> Frame {
    let base = frame.extent();
    let red_rect = Rect::new(base.x + red_offset.0, base.y + red_offset.1, base.width, base.height);
    let blue_rect = Rect::new(base.x + blue_offset.0, base.y + blue_offset.1, base.width, base.height);
    let union = base.union(&red_rect).union(&blue_rect);

    Frame::generate(union, |x, y| {
        let (xi, yi) = (x.floor() as i32, y.floor() as i32);
        let r = frame.get(xi - red_offset.0, yi - red_offset.1);
        let g = frame.get(xi, yi);
        let b = frame.get(xi - blue_offset.0, yi - blue_offset.1);
        [r[0], g[1], b[2], r[3].max(g[3]).max(b[3])]
    })
}
