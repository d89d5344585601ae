use facegate_core::localizer::{DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR};
use std::path::PathBuf;

/// CLI configuration, loaded from `FACEGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing detector models.
    pub model_dir: PathBuf,
    /// Haar cascade XML used by the localizer.
    pub cascade_path: PathBuf,
    /// JSON file holding enrolled identities.
    pub gallery_path: PathBuf,
    /// Cosine distance below which two signatures are the same identity.
    pub tolerance: f32,
    /// Detector pyramid step.
    pub scale_factor: f64,
    /// Detector neighbor-grouping threshold.
    pub min_neighbors: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facegate_core::default_model_dir);

        let cascade_path = var("FACEGATE_CASCADE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join(facegate_core::DEFAULT_CASCADE_FILE));

        let gallery_path = var("FACEGATE_GALLERY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| facegate_core::data_dir().join("gallery.json"));

        Self {
            model_dir,
            cascade_path,
            gallery_path,
            tolerance: parse_or(&var, "FACEGATE_TOLERANCE", 0.3),
            scale_factor: parse_or(&var, "FACEGATE_SCALE_FACTOR", DEFAULT_SCALE_FACTOR),
            min_neighbors: parse_or(&var, "FACEGATE_MIN_NEIGHBORS", DEFAULT_MIN_NEIGHBORS),
        }
    }
}

fn parse_or<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
