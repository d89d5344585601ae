mod config;
mod gallery;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::localizer::pick_primary;
use facegate_core::{
    DetectionParams, FaceEncoder, FaceLocalizer, HaarCascade, Image, MatchResult, Signature,
};
use gallery::Gallery;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facegate", about = "Face detection, enrollment and identification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every face rectangle found in an image
    Detect {
        /// Image file to scan
        image: PathBuf,
    },
    /// Print the signature of the primary face as JSON
    Encode {
        /// Image file to encode
        image: PathBuf,
    },
    /// Enroll the primary face in an image under an identity
    Enroll {
        /// Image file to enroll
        image: PathBuf,
        /// Identity the face belongs to
        #[arg(short, long)]
        identity: String,
        /// Label for this capture (e.g., "normal", "glasses")
        #[arg(short, long, default_value = "")]
        label: String,
    },
    /// Match the primary face in an image against the gallery
    Identify {
        /// Image file to identify
        image: PathBuf,
        /// Maximum cosine distance for a match (overrides FACEGATE_TOLERANCE)
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// List enrolled faces
    List,
    /// Remove an enrolled face
    Remove {
        /// Entry ID to remove
        id: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_env();
    tracing::debug!(
        model_dir = %config.model_dir.display(),
        cascade = %config.cascade_path.display(),
        gallery = %config.gallery_path.display(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Detect { image } => {
            let encoder = build_encoder(&config)?;
            let rects = encoder.localizer().detect_all(&open_image(&image)?);
            let Some(primary) = pick_primary(&rects) else {
                println!("No face detected");
                return Ok(());
            };
            for r in &rects {
                let marker = if *r == primary { "*" } else { " " };
                println!("{marker} x={} y={} w={} h={}", r.x, r.y, r.width, r.height);
            }
        }
        Commands::Encode { image } => {
            let encoder = build_encoder(&config)?;
            let sig = encoder
                .encode(&open_image(&image)?)
                .context("No face detected")?;
            let out = serde_json::json!({
                "values": sig.values(),
                "blob": hex::encode(sig.to_bytes()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Enroll {
            image,
            identity,
            label,
        } => {
            let encoder = build_encoder(&config)?;
            let (rect, sig) = encoder
                .encode_with_region(&open_image(&image)?)
                .context("No face detected")?;
            let mut gallery = Gallery::load(&config.gallery_path)?;
            let id = gallery.enroll(&identity, &label, &sig, config.tolerance)?;
            gallery.save()?;
            tracing::info!(%id, %identity, ?rect, "face enrolled");
            println!("Enrolled {identity} as {id}");
        }
        Commands::Identify { image, tolerance } => {
            let tolerance = tolerance.unwrap_or(config.tolerance);
            let encoder = build_encoder(&config)?;
            let gallery = Gallery::load(&config.gallery_path)?;
            let signatures: Vec<Signature> = gallery.signatures()?;

            let result = encoder
                .identify(&open_image(&image)?, &signatures, tolerance)
                .context("matching failed")?;
            match result {
                MatchResult::NoFaceFound => println!("No face detected"),
                MatchResult::NoMatch => println!("Face not recognized"),
                MatchResult::Matched { index, distance } => {
                    let entry = &gallery.entries()[index];
                    println!("{} (distance {distance:.4})", entry.identity);
                }
            }
        }
        Commands::List => {
            let gallery = Gallery::load(&config.gallery_path)?;
            if gallery.entries().is_empty() {
                println!("No faces enrolled");
            }
            for e in gallery.entries() {
                println!(
                    "{}  {}  {}  {}",
                    e.id,
                    e.identity,
                    e.label,
                    e.enrolled_at.to_rfc3339()
                );
            }
        }
        Commands::Remove { id } => {
            let mut gallery = Gallery::load(&config.gallery_path)?;
            if gallery.remove(&id) {
                gallery.save()?;
                println!("Removed {id}");
            } else {
                println!("No enrolled face with id {id}");
            }
        }
    }

    Ok(())
}

fn build_encoder(config: &config::Config) -> Result<FaceEncoder<HaarCascade>> {
    let cascade = HaarCascade::load(&config.cascade_path.to_string_lossy())
        .context("failed to load face cascade")?;
    let params = DetectionParams::new(config.scale_factor, config.min_neighbors)?;
    Ok(FaceEncoder::new(FaceLocalizer::new(Arc::new(cascade), params)))
}

fn open_image(path: &Path) -> Result<Image> {
    Image::open(path).with_context(|| format!("failed to open image {}", path.display()))
}
