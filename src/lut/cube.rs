use crate::errors::{FxError, Result};

pub const MAX_CUBE_SIZE: usize = 128;

/// Parsed 3D color cube: `size`³ entries of RGBA, red varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct LutBuffer {
    size: usize,
    data: Vec<f32>,
}

impl LutBuffer {
    /// Validates that `data` holds exactly `size`³ × 4 floats.
    pub fn new(size: usize, data: Vec<f32>) -> Result<Self> {
        if !(2..=MAX_CUBE_SIZE).contains(&size) {
            return Err(FxError::LutParse {
                name: String::new(),
                message: format!("cube size {} out of range", size),
            });
        }
        let expected = size * size * size * 4;
        if data.len() != expected {
            return Err(FxError::LutParse {
                name: String::new(),
                message: format!("buffer holds {} floats, expected {}", data.len(), expected),
            });
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn entry(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        let i = ((b * self.size + g) * self.size + r) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Trilinear lookup of an RGB triple; inputs are clamped to the unit cube.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let max = (self.size - 1) as f32;
        let pos = rgb.map(|v| v.clamp(0.0, 1.0) * max);
        let lo = pos.map(|p| (p.floor() as usize).min(self.size - 2));
        let t = [pos[0] - lo[0] as f32, pos[1] - lo[1] as f32, pos[2] - lo[2] as f32];

        let mut out = [0.0f32; 3];
        for (corner, weight) in [
            ((0, 0, 0), (1.0 - t[0]) * (1.0 - t[1]) * (1.0 - t[2])),
            ((1, 0, 0), t[0] * (1.0 - t[1]) * (1.0 - t[2])),
            ((0, 1, 0), (1.0 - t[0]) * t[1] * (1.0 - t[2])),
            ((1, 1, 0), t[0] * t[1] * (1.0 - t[2])),
            ((0, 0, 1), (1.0 - t[0]) * (1.0 - t[1]) * t[2]),
            ((1, 0, 1), t[0] * (1.0 - t[1]) * t[2]),
            ((0, 1, 1), (1.0 - t[0]) * t[1] * t[2]),
            ((1, 1, 1), t[0] * t[1] * t[2]),
        ] {
            let e = self.entry(lo[0] + corner.0, lo[1] + corner.1, lo[2] + corner.2);
            for c in 0..3 {
                out[c] += e[c] * weight;
            }
        }
        out
    }

    /// Grades one RGBA pixel; alpha passes through.
    #[inline]
    pub fn apply_px(&self, px: [f32; 4]) -> [f32; 4] {
        let [r, g, b] = self.sample([px[0], px[1], px[2]]);
        [r, g, b, px[3]]
    }
}

fn parse_error(name: &str, line_no: usize, message: impl Into<String>) -> FxError {
    FxError::LutParse {
        name: name.to_string(),
        message: format!("line {}: {}", line_no, message.into()),
    }
}

/// Parses `.cube` text. Blank lines, `#` comments, `TITLE` and `DOMAIN_*` lines are skipped;
/// a `LUT_3D_SIZE N` line must precede exactly N³ rows of three floats.
pub fn parse_cube(name: &str, text: &str) -> Result<LutBuffer> {
    let mut size: Option<usize> = None;
    let mut data: Vec<f32> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("TITLE") || line.starts_with("DOMAIN_") {
            continue;
        }

        if let Some(rest) = line.strip_prefix("LUT_3D_SIZE") {
            if size.is_some() {
                return Err(parse_error(name, line_no, "duplicate LUT_3D_SIZE"));
            }
            let n: usize = rest
                .trim()
                .parse()
                .map_err(|_| parse_error(name, line_no, format!("bad cube size '{}'", rest.trim())))?;
            if !(2..=MAX_CUBE_SIZE).contains(&n) {
                return Err(parse_error(name, line_no, format!("cube size {} out of range", n)));
            }
            data.reserve(n * n * n * 4);
            size = Some(n);
            continue;
        }

        let Some(n) = size else {
            return Err(parse_error(name, line_no, "data before LUT_3D_SIZE"));
        };

        let mut components = line.split_whitespace().map(str::parse::<f32>);
        match (components.next(), components.next(), components.next(), components.next()) {
            (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) => {
                if data.len() >= n * n * n * 4 {
                    return Err(parse_error(name, line_no, "more rows than LUT_3D_SIZE declares"));
                }
                data.extend_from_slice(&[r, g, b, 1.0]);
            }
            _ => return Err(parse_error(name, line_no, format!("unrecognized line '{}'", line))),
        }
    }

    let n = size.ok_or_else(|| FxError::LutParse {
        name: name.to_string(),
        message: "missing LUT_3D_SIZE".to_string(),
    })?;

    LutBuffer::new(n, data).map_err(|e| match e {
        FxError::LutParse { message, .. } => FxError::LutParse { name: name.to_string(), message },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_2: &str = "# identity\nTITLE \"id\"\nLUT_3D_SIZE 2\nDOMAIN_MIN 0.0 0.0 0.0\nDOMAIN_MAX 1.0 1.0 1.0\n\n\
        0 0 0\n1 0 0\n0 1 0\n1 1 0\n0 0 1\n1 0 1\n0 1 1\n1 1 1\n";

    #[test]
    fn parses_identity_and_appends_alpha() {
        let lut = parse_cube("id.cube", IDENTITY_2).unwrap();
        assert_eq!(lut.size(), 2);
        assert_eq!(lut.data().len(), 2 * 2 * 2 * 4);
        assert_eq!(&lut.data()[4..8], &[1.0, 0.0, 0.0, 1.0]);
        let out = lut.sample([0.3, 0.6, 0.9]);
        for (a, b) in out.iter().zip([0.3, 0.6, 0.9]) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_wrong_row_count() {
        let short = IDENTITY_2.replace("1 1 1\n", "");
        assert!(matches!(parse_cube("short.cube", &short), Err(FxError::LutParse { .. })));

        let long = format!("{}0.5 0.5 0.5\n", IDENTITY_2);
        assert!(parse_cube("long.cube", &long).is_err());
    }

    #[test]
    fn rejects_garbage_and_missing_size() {
        assert!(parse_cube("x", "0 0 0\n").is_err());
        assert!(parse_cube("x", "LUT_3D_SIZE two\n").is_err());
        assert!(parse_cube("x", "LUT_3D_SIZE 2\n0 0\n").is_err());
        assert!(parse_cube("x", "").is_err());
    }

    #[test]
    fn buffer_length_is_validated() {
        assert!(LutBuffer::new(2, vec![0.0; 31]).is_err());
        assert!(LutBuffer::new(2, vec![0.0; 32]).is_ok());
    }
}
