//! On-disk gallery of enrolled signatures, stored as a JSON array.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use facegate_core::{CosineMatcher, Matcher, Signature};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One enrolled face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: String,
    pub identity: String,
    #[serde(default)]
    pub label: String,
    /// Hex-encoded little-endian `f32` blob.
    pub signature: String,
    pub enrolled_at: DateTime<Utc>,
}

impl GalleryEntry {
    pub fn new(identity: &str, label: &str, signature: &Signature) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            label: label.to_string(),
            signature: hex::encode(signature.to_bytes()),
            enrolled_at: Utc::now(),
        }
    }

    pub fn decode_signature(&self) -> Result<Signature> {
        let bytes = hex::decode(&self.signature)
            .with_context(|| format!("entry {} has a non-hex signature", self.id))?;
        Signature::from_bytes(&bytes)
            .with_context(|| format!("entry {} has an invalid signature", self.id))
    }
}

pub struct Gallery {
    path: PathBuf,
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    /// Load the gallery at `path`. A missing file is an empty gallery.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse gallery {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read gallery {}", path.display()))
            }
        };
        tracing::debug!(path = %path.display(), count = entries.len(), "gallery loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn add(&mut self, entry: GalleryEntry) {
        self.entries.push(entry);
    }

    /// The enrolled entry `signature` is identified as at `tolerance`, if any.
    pub fn find_match(
        &self,
        signature: &Signature,
        tolerance: f32,
    ) -> Result<Option<(&GalleryEntry, f32)>> {
        let signatures = self.signatures()?;
        let hit = CosineMatcher.identify(
            signature,
            self.entries.iter().zip(&signatures),
            tolerance,
        )?;
        Ok(hit)
    }

    /// Add a new entry unless the face already matches an enrolled one.
    /// Returns the new entry's id.
    pub fn enroll(
        &mut self,
        identity: &str,
        label: &str,
        signature: &Signature,
        tolerance: f32,
    ) -> Result<String> {
        if let Some((existing, distance)) = self.find_match(signature, tolerance)? {
            anyhow::bail!(
                "This face is already registered with identity: {} (id {}, distance {distance:.4})",
                existing.identity,
                existing.id
            );
        }
        let entry = GalleryEntry::new(identity, label, signature);
        let id = entry.id.clone();
        self.add(entry);
        Ok(id)
    }

    /// Remove the entry with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Decode every signature, in entry order.
    pub fn signatures(&self) -> Result<Vec<Signature>> {
        self.entries.iter().map(GalleryEntry::decode_signature).collect()
    }

    /// Write the gallery through a temp file and rename it into place.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), count = self.entries.len(), "gallery saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::SIGNATURE_LEN;

    fn signature(seed: f32) -> Signature {
        Signature::from_values((0..SIGNATURE_LEN).map(|i| seed + i as f32).collect())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Gallery::load(&dir.path().join("gallery.json")).unwrap();
        assert!(gallery.entries().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gallery.json");

        let mut gallery = Gallery::load(&path).unwrap();
        gallery.add(GalleryEntry::new("alice", "normal", &signature(1.0)));
        gallery.add(GalleryEntry::new("bob", "", &signature(2.0)));
        gallery.save().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = Gallery::load(&path).unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(reloaded.entries()[0].identity, "alice");
        assert_eq!(reloaded.entries()[0].label, "normal");
        let sigs = reloaded.signatures().unwrap();
        assert_eq!(sigs[0], signature(1.0));
        assert_eq!(sigs[1], signature(2.0));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::load(&dir.path().join("g.json")).unwrap();
        let entry = GalleryEntry::new("alice", "", &signature(0.0));
        let id = entry.id.clone();
        gallery.add(entry);

        assert!(!gallery.remove("not-an-id"));
        assert!(gallery.remove(&id));
        assert!(gallery.entries().is_empty());
    }

    /// Every other value set, starting at `phase`; the two phases are orthogonal.
    fn alternating(phase: usize) -> Signature {
        Signature::from_values(
            (0..SIGNATURE_LEN)
                .map(|i| if i % 2 == phase { 1.0 } else { 0.0 })
                .collect(),
        )
    }

    #[test]
    fn test_enroll_rejects_same_face_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::load(&dir.path().join("g.json")).unwrap();

        let id = gallery.enroll("alice", "normal", &alternating(0), 0.3).unwrap();
        let err = gallery
            .enroll("mallory", "", &alternating(0), 0.3)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("already registered with identity: alice"), "{msg}");
        assert!(msg.contains(&id), "{msg}");
        assert_eq!(gallery.entries().len(), 1);
    }

    #[test]
    fn test_enroll_accepts_distinct_face() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::load(&dir.path().join("g.json")).unwrap();
        gallery.enroll("alice", "", &alternating(0), 0.3).unwrap();
        gallery.enroll("bob", "", &alternating(1), 0.3).unwrap();

        let (hit, distance) = gallery.find_match(&alternating(1), 0.3).unwrap().unwrap();
        assert_eq!(hit.identity, "bob");
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_find_match_surfaces_corrupt_entry() {
        let mut gallery = Gallery::load(Path::new("/nonexistent/g.json")).unwrap();
        let mut entry = GalleryEntry::new("alice", "", &alternating(0));
        let mut nan = alternating(0).to_bytes();
        nan[..4].copy_from_slice(&f32::NAN.to_le_bytes());
        entry.signature = hex::encode(nan);
        gallery.add(entry);
        assert!(gallery.find_match(&alternating(0), 0.3).is_err());
    }

    #[test]
    fn test_corrupt_signature_is_error() {
        let mut entry = GalleryEntry::new("alice", "", &signature(0.0));
        entry.signature = "zz".into();
        assert!(entry.decode_signature().is_err());

        entry.signature = hex::encode([0u8; 12]);
        assert!(entry.decode_signature().is_err());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Gallery::load(&path).is_err());
    }
}
