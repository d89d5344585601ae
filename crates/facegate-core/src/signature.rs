//! Face signatures: a fixed-length vector derived only from pixel content.
//!
//! The crop is resized to a canonical 100x100 grid, then summarized as a
//! normalized 32-bin intensity histogram followed by five statistics
//! (mean, std dev, median, min, max). 37 values total.

use crate::frame::resize_bilinear;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Named constants ---
pub const CANONICAL_SIZE: usize = 100;
pub const HISTOGRAM_BINS: usize = 32;
pub const STATISTICS_LEN: usize = 5;
pub const SIGNATURE_LEN: usize = HISTOGRAM_BINS + STATISTICS_LEN;
/// Intensity levels per histogram bin (256 / 32).
const BIN_WIDTH: usize = 256 / HISTOGRAM_BINS;
const BYTES_PER_VALUE: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("signature blob length {0} is not a multiple of {BYTES_PER_VALUE}")]
    TruncatedBlob(usize),
    #[error("signature blob holds {actual} values, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("signature value {index} is not finite")]
    NonFinite { index: usize },
}

/// Fixed-length numeric summary of a face region. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature {
    values: Vec<f32>,
}

impl Signature {
    /// Wrap precomputed values, e.g. ones loaded from storage.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Extract the signature of a grayscale face crop. Deterministic.
    pub fn extract(face: ArrayView2<u8>) -> Self {
        let canonical = resize_bilinear(face, CANONICAL_SIZE, CANONICAL_SIZE);
        let mut pixels: Vec<u8> = canonical.iter().copied().collect();

        let mut values = Vec::with_capacity(SIGNATURE_LEN);
        values.extend(intensity_histogram(&pixels));
        values.extend(statistics(&mut pixels));

        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The normalized histogram part, if this is a full-length signature.
    pub fn histogram(&self) -> Option<&[f32]> {
        (self.len() == SIGNATURE_LEN).then(|| &self.values[..HISTOGRAM_BINS])
    }

    /// `[mean, std, median, min, max]`, if this is a full-length signature.
    pub fn statistics(&self) -> Option<&[f32]> {
        (self.len() == SIGNATURE_LEN).then(|| &self.values[HISTOGRAM_BINS..])
    }

    /// Serialize to an opaque blob: little-endian `f32`s, 4 bytes each.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`to_bytes`](Self::to_bytes). Only full-length, finite signatures are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() % BYTES_PER_VALUE != 0 {
            return Err(SignatureError::TruncatedBlob(bytes.len()));
        }
        let values: Vec<f32> = bytes
            .chunks_exact(BYTES_PER_VALUE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if values.len() != SIGNATURE_LEN {
            return Err(SignatureError::WrongLength {
                expected: SIGNATURE_LEN,
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(SignatureError::NonFinite { index });
        }
        Ok(Self { values })
    }
}

/// 32-bin histogram over [0, 256), normalized to sum to 1.
fn intensity_histogram(pixels: &[u8]) -> [f32; HISTOGRAM_BINS] {
    let mut counts = [0u32; HISTOGRAM_BINS];
    for &p in pixels {
        counts[p as usize / BIN_WIDTH] += 1;
    }
    let total = pixels.len().max(1) as f64;
    counts.map(|c| (c as f64 / total) as f32)
}

/// Mean, population std dev, median, min, max. Sorts `pixels` in place.
fn statistics(pixels: &mut [u8]) -> [f32; STATISTICS_LEN] {
    if pixels.is_empty() {
        return [0.0; STATISTICS_LEN];
    }
    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / n;
    let variance = pixels
        .iter()
        .map(|&p| (p as f64 - mean).powi(2))
        .sum::<f64>()
        / n;

    pixels.sort_unstable();
    let mid = pixels.len() / 2;
    let median = if pixels.len() % 2 == 0 {
        (pixels[mid - 1] as f64 + pixels[mid] as f64) / 2.0
    } else {
        pixels[mid] as f64
    };
    let min = pixels[0] as f64;
    let max = pixels[pixels.len() - 1] as f64;

    [mean, variance.sqrt(), median, min, max].map(|v| v as f32)
}
