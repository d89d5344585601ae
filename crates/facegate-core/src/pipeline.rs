//! Image -> localizer -> signature -> matcher.

use crate::frame::Image;
use crate::localizer::{FaceLocalizer, ObjectDetector};
use crate::matcher::{CosineMatcher, MatchError, Matcher};
use crate::signature::Signature;
use crate::types::{MatchResult, Rect};

/// End-to-end encoder: owns a localizer (and its shared detector) plus a matcher.
///
/// Stateless between calls; wrap in an `Arc` or clone it to serve concurrent
/// requests.
pub struct FaceEncoder<D: ObjectDetector + ?Sized, M: Matcher = CosineMatcher> {
    localizer: FaceLocalizer<D>,
    matcher: M,
}

impl<D: ObjectDetector + ?Sized> FaceEncoder<D, CosineMatcher> {
    pub fn new(localizer: FaceLocalizer<D>) -> Self {
        Self {
            localizer,
            matcher: CosineMatcher,
        }
    }
}

impl<D: ObjectDetector + ?Sized, M: Matcher> FaceEncoder<D, M> {
    pub fn with_matcher(localizer: FaceLocalizer<D>, matcher: M) -> Self {
        Self { localizer, matcher }
    }

    pub fn localizer(&self) -> &FaceLocalizer<D> {
        &self.localizer
    }

    /// Signature of the primary face, with where it was found.
    pub fn encode_with_region(&self, image: &Image) -> Option<(Rect, Signature)> {
        let face = self.localizer.locate(image)?;
        Some((face.rect, Signature::extract(face.pixels.view())))
    }

    /// Signature of the primary face; `None` when no face is detected.
    pub fn encode(&self, image: &Image) -> Option<Signature> {
        self.encode_with_region(image).map(|(_, sig)| sig)
    }

    /// Encode `image` and match it against `candidates`.
    pub fn identify<'a, I>(
        &self,
        image: &Image,
        candidates: I,
        tolerance: f32,
    ) -> Result<MatchResult, MatchError>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        let Some(query) = self.encode(image) else {
            tracing::debug!("no face detected");
            return Ok(MatchResult::NoFaceFound);
        };
        Ok(self.matcher.compare(&query, candidates, tolerance)?.into())
    }
}
