use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Intersect with a `width x height` image, returning `None` if nothing is left.
    pub fn clamp_to(&self, width: usize, height: usize) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.right().min(width as i32);
        let y1 = self.bottom().min(height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// A located face: where it is, and its grayscale pixels.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub rect: Rect,
    /// Cropped grayscale pixels, `rect.height x rect.width`.
    pub pixels: Array2<u8>,
}

/// Best candidate under the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Position of the winning candidate in the order it was supplied.
    pub index: usize,
    /// Cosine-derived distance, lower = more similar.
    pub distance: f32,
}

/// Outcome of matching a captured image against enrolled signatures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchResult {
    NoFaceFound,
    NoMatch,
    Matched { index: usize, distance: f32 },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

impl From<Option<Match>> for MatchResult {
    fn from(m: Option<Match>) -> Self {
        match m {
            Some(Match { index, distance }) => MatchResult::Matched { index, distance },
            None => MatchResult::NoMatch,
        }
    }
}
