//! facegate-core — face localization, signature extraction and matching.
//!
//! Faces are located with a boosted Haar cascade, summarized as a 37-value
//! intensity signature, and matched against enrolled signatures by
//! cosine-derived distance.

pub mod cascade;
pub mod frame;
pub mod localizer;
pub mod matcher;
pub mod pipeline;
pub mod signature;
pub mod types;

use std::path::PathBuf;

pub use cascade::{CascadeError, HaarCascade};
pub use frame::{Image, ImageError};
pub use localizer::{DetectionParams, FaceLocalizer, ObjectDetector, ParamsError};
pub use matcher::{cosine_distance, CosineMatcher, MatchError, Matcher};
pub use pipeline::FaceEncoder;
pub use signature::{Signature, SignatureError, SIGNATURE_LEN};
pub use types::{FaceRegion, Match, MatchResult, Rect};

/// File name of the stock OpenCV frontal-face cascade.
pub const DEFAULT_CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

/// Default directory searched for detector models.
///
/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share/facegate/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// Per-user data directory: `$XDG_DATA_HOME/facegate` or `~/.local/share/facegate`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}
