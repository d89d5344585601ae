//! Face localization: run the detector on the luminance image and pick one region.

use crate::frame::{crop, Image};
use crate::types::{FaceRegion, Rect};
use ndarray::ArrayView2;
use std::sync::Arc;
use thiserror::Error;

// --- Named constants (tunable, not protocol) ---
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum ParamsError {
    #[error("scale factor must be finite and greater than 1.0, got {0}")]
    InvalidScaleFactor(f64),
}

/// Pyramid step and grouping threshold handed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    scale_factor: f64,
    min_neighbors: usize,
}

impl DetectionParams {
    pub fn new(scale_factor: f64, min_neighbors: usize) -> Result<Self, ParamsError> {
        if !scale_factor.is_finite() || scale_factor <= 1.0 {
            return Err(ParamsError::InvalidScaleFactor(scale_factor));
        }
        Ok(Self {
            scale_factor,
            min_neighbors,
        })
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
        }
    }
}

/// A generic frontal-object detector over grayscale images.
///
/// Implementations are read-only after construction so a single instance can
/// serve concurrent callers.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, gray: ArrayView2<u8>, params: &DetectionParams) -> Vec<Rect>;
}

/// Finds the face region to encode in a captured image.
pub struct FaceLocalizer<D: ObjectDetector + ?Sized> {
    detector: Arc<D>,
    params: DetectionParams,
}

impl<D: ObjectDetector + ?Sized> Clone for FaceLocalizer<D> {
    fn clone(&self) -> Self {
        Self {
            detector: Arc::clone(&self.detector),
            params: self.params,
        }
    }
}

impl<D: ObjectDetector + ?Sized> FaceLocalizer<D> {
    pub fn new(detector: Arc<D>, params: DetectionParams) -> Self {
        Self { detector, params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Every face the detector reports, clamped to the image, in detector order.
    pub fn detect_all(&self, image: &Image) -> Vec<Rect> {
        let gray = image.to_grayscale();
        self.detect_gray(gray.view())
    }

    fn detect_gray(&self, gray: ArrayView2<u8>) -> Vec<Rect> {
        let (h, w) = gray.dim();
        self.detector
            .detect(gray, &self.params)
            .into_iter()
            .filter_map(|r| r.clamp_to(w, h))
            .collect()
    }

    /// Locate one face. `None` when the detector finds nothing.
    ///
    /// With several candidates the largest wins, then the top-most, then the
    /// left-most, so the choice never depends on detector output order.
    pub fn locate(&self, image: &Image) -> Option<FaceRegion> {
        let gray = image.to_grayscale();
        let rects = self.detect_gray(gray.view());
        let rect = pick_primary(&rects)?;

        tracing::debug!(
            candidates = rects.len(),
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "face located"
        );

        Some(FaceRegion {
            pixels: crop(&gray, &rect),
            rect,
        })
    }
}

/// Largest area first; ties go to smaller `y`, then smaller `x`.
pub fn pick_primary(rects: &[Rect]) -> Option<Rect> {
    rects
        .iter()
        .min_by_key(|r| (std::cmp::Reverse(r.area()), r.y, r.x))
        .copied()
}
