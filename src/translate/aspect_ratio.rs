use serde::{Serialize, Serializer};
use std::fmt;

/// Aspect ratios accepted by the queue models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape16x9,
    Portrait9x16,
    Ultrawide21x9,
    Tall9x21,
    Landscape4x3,
    Portrait3x4,
    Landscape3x2,
    Portrait2x3,
}

/// Order in which numeric ratios are matched, with their tolerance.
const NUMERIC_CANDIDATES: [(AspectRatio, f64); 9] = [
    (AspectRatio::Square, 0.05),
    (AspectRatio::Landscape16x9, 0.1),
    (AspectRatio::Portrait9x16, 0.1),
    (AspectRatio::Landscape4x3, 0.1),
    (AspectRatio::Portrait3x4, 0.1),
    (AspectRatio::Ultrawide21x9, 0.1),
    (AspectRatio::Tall9x21, 0.1),
    (AspectRatio::Landscape3x2, 0.1),
    (AspectRatio::Portrait2x3, 0.1),
];

impl AspectRatio {
    pub const ALL: [AspectRatio; 9] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Ultrawide21x9,
        AspectRatio::Tall9x21,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Ultrawide21x9 => "21:9",
            AspectRatio::Tall9x21 => "9:21",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
        }
    }

    pub fn value(&self) -> f64 {
        let (w, h) = match self {
            AspectRatio::Square => (1.0, 1.0),
            AspectRatio::Landscape16x9 => (16.0, 9.0),
            AspectRatio::Portrait9x16 => (9.0, 16.0),
            AspectRatio::Ultrawide21x9 => (21.0, 9.0),
            AspectRatio::Tall9x21 => (9.0, 21.0),
            AspectRatio::Landscape4x3 => (4.0, 3.0),
            AspectRatio::Portrait3x4 => (3.0, 4.0),
            AspectRatio::Landscape3x2 => (3.0, 2.0),
            AspectRatio::Portrait2x3 => (2.0, 3.0),
        };
        w / h
    }

    fn from_known_token(token: &str) -> Option<Self> {
        match token {
            "256x256" | "512x512" | "1024x1024" => Some(AspectRatio::Square),
            "1792x1024" => Some(AspectRatio::Landscape16x9),
            "1024x1792" => Some(AspectRatio::Portrait9x16),
            other => Self::ALL.into_iter().find(|ratio| ratio.as_str() == other),
        }
    }

    fn closest(ratio: f64) -> Option<Self> {
        NUMERIC_CANDIDATES
            .iter()
            .find(|(candidate, tolerance)| (ratio - candidate.value()).abs() < *tolerance)
            .map(|(candidate, _)| *candidate)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AspectRatio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Leading decimal digits of `part`, ignoring surrounding junk such as `9/2`.
fn leading_number(part: &str) -> Option<u64> {
    let part = part.trim_start();
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().ok()
}

fn parse_dimensions(token: &str) -> Option<(u64, u64)> {
    let parts: Vec<&str> = token.split(|c: char| c == ':' || c == 'x').collect();
    let [w, h] = parts[..] else {
        return None;
    };
    let (w, h) = (leading_number(w)?, leading_number(h)?);
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

/// Maps an OpenAI `size` (pixels like `1024x1792` or a ratio like `16:9`/`16/9`)
/// onto a supported aspect ratio. Never fails: anything unusable becomes 1:1.
pub fn normalize(size: Option<&str>) -> AspectRatio {
    let Some(raw) = size else {
        return AspectRatio::Square;
    };
    // Only the first slash acts as a separator.
    let token = raw.trim().to_lowercase().replacen('/', ":", 1);

    if let Some(ratio) = AspectRatio::from_known_token(&token) {
        return ratio;
    }

    let numeric = parse_dimensions(&token)
        .and_then(|(w, h)| AspectRatio::closest(w as f64 / h as f64));
    if let Some(ratio) = numeric {
        return ratio;
    }

    log::warn!(
        "Unmapped or invalid size '{}', defaulting to 1:1. Check model aspect_ratio support.",
        raw
    );
    AspectRatio::Square
}
