//! Nearest-neighbor matching of a query signature against enrolled signatures.

use crate::signature::Signature;
use crate::types::Match;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("candidate {index} has {actual} dimensions but the query has {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("tolerance must be finite, got {0}")]
    InvalidTolerance(f32),
}

/// Cosine-derived distance in [0, 2]: `1 - cos(a, b)`.
///
/// Returns 1.0 when either vector has zero norm or holds a non-finite value.
/// Identical non-zero inputs give exactly 0.0.
pub fn cosine_distance(a: &Signature, b: &Signature) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.values().iter().zip(b.values()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    // sqrt of the product keeps self-similarity at exactly 1.0
    let similarity = dot / (norm_a * norm_b).sqrt();
    if !similarity.is_finite() {
        return 1.0;
    }
    (1.0 - similarity).max(0.0) as f32
}

/// Strategy for comparing a query signature against enrolled signatures.
pub trait Matcher {
    /// Best candidate whose distance is strictly below `tolerance`.
    ///
    /// Every candidate is checked for dimension agreement before a result is
    /// returned. Ties on distance go to the lowest index.
    fn compare<'a, I>(
        &self,
        query: &Signature,
        candidates: I,
        tolerance: f32,
    ) -> Result<Option<Match>, MatchError>
    where
        I: IntoIterator<Item = &'a Signature>;

    /// Keyed form of [`compare`](Self::compare) over `(identity, signature)` pairs.
    fn identify<'a, K, I>(
        &self,
        query: &Signature,
        entries: I,
        tolerance: f32,
    ) -> Result<Option<(K, f32)>, MatchError>
    where
        I: IntoIterator<Item = (K, &'a Signature)>,
    {
        let (keys, signatures): (Vec<K>, Vec<&Signature>) = entries.into_iter().unzip();
        let best = self.compare(query, signatures, tolerance)?;
        Ok(best.and_then(|m| keys.into_iter().nth(m.index).map(|k| (k, m.distance))))
    }
}

/// Linear-scan matcher over cosine-derived distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare<'a, I>(
        &self,
        query: &Signature,
        candidates: I,
        tolerance: f32,
    ) -> Result<Option<Match>, MatchError>
    where
        I: IntoIterator<Item = &'a Signature>,
    {
        if !tolerance.is_finite() {
            return Err(MatchError::InvalidTolerance(tolerance));
        }

        let mut best: Option<Match> = None;
        let mut scanned = 0usize;

        for (index, candidate) in candidates.into_iter().enumerate() {
            if candidate.len() != query.len() {
                return Err(MatchError::DimensionMismatch {
                    index,
                    expected: query.len(),
                    actual: candidate.len(),
                });
            }
            let distance = cosine_distance(query, candidate);
            // Strict comparison: the first of equal distances wins.
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Match { index, distance });
            }
            scanned += 1;
        }

        let result = best.filter(|b| b.distance < tolerance);
        tracing::debug!(
            candidates = scanned,
            best_distance = ?best.map(|b| b.distance),
            tolerance,
            matched = result.is_some(),
            "match scan"
        );
        Ok(result)
    }
}
