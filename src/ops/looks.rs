use serde::{Deserialize, Serialize};

use super::color::{self, color_matrix};
use crate::frame::{luma, Frame};

/// Named built-in photo looks used by procedural presets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuiltinLook {
    Mono,
    Noir,
    Tonal,
    Fade,
    Chrome,
    Process,
    Instant,
    Sepia,
    /// A name this build does not know; renders as a no-op
    Unsupported(String),
}

impl From<String> for BuiltinLook {
    fn from(name: String) -> Self {
        match name.as_str() {
            "mono" => BuiltinLook::Mono,
            "noir" => BuiltinLook::Noir,
            "tonal" => BuiltinLook::Tonal,
            "fade" => BuiltinLook::Fade,
            "chrome" => BuiltinLook::Chrome,
            "process" => BuiltinLook::Process,
            "instant" => BuiltinLook::Instant,
            "sepia" => BuiltinLook::Sepia,
            _ => BuiltinLook::Unsupported(name),
        }
    }
}

impl From<BuiltinLook> for String {
    fn from(look: BuiltinLook) -> Self {
        look.name().to_string()
    }
}

impl BuiltinLook {
    pub fn name(&self) -> &str {
        match self {
            BuiltinLook::Mono => "mono",
            BuiltinLook::Noir => "noir",
            BuiltinLook::Tonal => "tonal",
            BuiltinLook::Fade => "fade",
            BuiltinLook::Chrome => "chrome",
            BuiltinLook::Process => "process",
            BuiltinLook::Instant => "instant",
            BuiltinLook::Sepia => "sepia",
            BuiltinLook::Unsupported(name) => name,
        }
    }

    /// Applies the look, or `None` when it is not supported.
    pub fn apply(&self, frame: &Frame) -> Option<Frame> {
        let out = match self {
            BuiltinLook::Mono => color::desaturate(frame),
            BuiltinLook::Noir => {
                let gray = color::desaturate(frame);
                color::tone_curve(&gray, &[(0.0, 0.0), (0.25, 0.12), (0.5, 0.5), (0.75, 0.88), (1.0, 1.0)])
            }
            BuiltinLook::Tonal => {
                let gray = color::desaturate(frame);
                color::tone_curve(&gray, &[(0.0, 0.04), (0.5, 0.5), (1.0, 0.96)])
            }
            BuiltinLook::Fade => {
                let muted = frame.map_pixels(|px| {
                    let l = luma(&px);
                    let mut out = px;
                    for c in out.iter_mut().take(3) {
                        *c = l + (*c - l) * 0.75;
                    }
                    out
                });
                color::tone_curve(&muted, &[(0.0, 0.1), (0.5, 0.52), (1.0, 0.92)])
            }
            BuiltinLook::Chrome => color_matrix(
                frame,
                [[1.12, -0.06, -0.06], [-0.04, 1.08, -0.04], [-0.06, -0.06, 1.12]],
                [0.0, 0.0, 0.0],
            ),
            BuiltinLook::Process => color_matrix(
                frame,
                [[0.95, 0.05, 0.0], [0.0, 1.0, 0.05], [0.05, 0.1, 0.85]],
                [0.02, 0.0, 0.06],
            ),
            BuiltinLook::Instant => {
                let warm = color_matrix(
                    frame,
                    [[1.05, 0.05, 0.0], [0.0, 1.0, 0.02], [0.0, 0.05, 0.9]],
                    [0.03, 0.02, 0.0],
                );
                color::tone_curve(&warm, &[(0.0, 0.06), (0.5, 0.53), (1.0, 0.95)])
            }
            BuiltinLook::Sepia => color_matrix(
                frame,
                [[0.393, 0.769, 0.189], [0.349, 0.686, 0.168], [0.272, 0.534, 0.131]],
                [0.0, 0.0, 0.0],
            ),
            BuiltinLook::Unsupported(_) => return None,
        };
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_unsupported() {
        let look: BuiltinLook = serde_json::from_str("\"holga\"").unwrap();
        assert_eq!(look, BuiltinLook::Unsupported("holga".into()));
        assert!(look.apply(&Frame::solid(2, 2, [0.5; 4])).is_none());

        let mono: BuiltinLook = serde_json::from_str("\"mono\"").unwrap();
        assert_eq!(serde_json::to_string(&mono).unwrap(), "\"mono\"");
    }

    #[test]
    fn mono_removes_color() {
        let out = BuiltinLook::Mono.apply(&Frame::solid(2, 2, [0.9, 0.1, 0.3, 1.0])).unwrap();
        let px = out.get(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}
