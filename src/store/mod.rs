//! Read access to the external metadata store.
//!
//! The document store that owns frame/region/detection records is an
//! external collaborator. This module consumes a JSON snapshot of object
//! records exported from it; avilearn never writes back.

use crate::constants::ELIGIBLE_CLASS;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One cropped-object record produced by the upstream detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Unique object identifier.
    pub object_id: String,

    /// Path to the crop image on disk.
    pub image_path: PathBuf,

    /// Detector confidence for this crop (not classifier confidence).
    pub confidence: f32,

    /// Identifier of the source frame.
    pub frame_id: String,

    /// Identifier of the motion region within the frame.
    pub region_id: String,

    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,

    /// Coarse class name assigned by the detector.
    #[serde(default = "default_class_name")]
    pub class_name: String,
}

fn default_class_name() -> String {
    ELIGIBLE_CLASS.to_string()
}

/// Read-only view over exported object records.
pub trait ObjectStore {
    /// Load records whose detector confidence is at least `min_confidence`
    /// and whose class name is eligible for the pipeline.
    fn load_objects(&self, min_confidence: f32) -> Result<Vec<ObjectRecord>>;
}

/// Object store backed by a JSON snapshot file.
///
/// The snapshot is a JSON array of object records.
#[derive(Debug, Clone)]
pub struct JsonObjectStore {
    path: PathBuf,
}

impl JsonObjectStore {
    /// Create a store reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ObjectStore for JsonObjectStore {
    fn load_objects(&self, min_confidence: f32) -> Result<Vec<ObjectRecord>> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| Error::MetadataRead {
            path: self.path.clone(),
            source: e,
        })?;

        let records: Vec<ObjectRecord> =
            serde_json::from_str(&contents).map_err(|e| Error::MetadataParse {
                path: self.path.clone(),
                source: e,
            })?;

        let total = records.len();
        let eligible: Vec<ObjectRecord> = records
            .into_iter()
            .filter(|r| r.confidence >= min_confidence && r.class_name == ELIGIBLE_CLASS)
            .collect();

        debug!(
            "Loaded {} object records, {} eligible (class '{}', confidence >= {})",
            total,
            eligible.len(),
            ELIGIBLE_CLASS,
            min_confidence
        );
        info!("{} bird objects available", eligible.len());

        Ok(eligible)
    }
}

/// List crop image paths under a directory, sorted for determinism.
pub fn list_crop_images(objects_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    if !objects_dir.exists() {
        return Ok(paths);
    }

    for entry in std::fs::read_dir(objects_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"));
        if is_image {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_snapshot(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_load_filters_by_confidence_and_class() {
        let file = write_snapshot(
            r#"[
            {"object_id": "a", "image_path": "data/objects/a.jpg", "confidence": 0.9,
             "frame_id": "f1", "region_id": "r1", "timestamp": "2026-01-01T00:00:00Z",
             "class_name": "bird"},
            {"object_id": "b", "image_path": "data/objects/b.jpg", "confidence": 0.3,
             "frame_id": "f1", "region_id": "r2", "timestamp": "2026-01-01T00:00:01Z",
             "class_name": "bird"},
            {"object_id": "c", "image_path": "data/objects/c.jpg", "confidence": 0.95,
             "frame_id": "f2", "region_id": "r1", "timestamp": "2026-01-01T00:00:02Z",
             "class_name": "squirrel"}
        ]"#,
        );

        let store = JsonObjectStore::new(file.path());
        let objects = store.load_objects(0.5).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].object_id, "a");
    }

    #[test]
    fn test_missing_class_name_defaults_to_bird() {
        let file = write_snapshot(
            r#"[
            {"object_id": "a", "image_path": "a.jpg", "confidence": 0.9,
             "frame_id": "f1", "region_id": "r1", "timestamp": "2026-01-01T00:00:00Z"}
        ]"#,
        );

        let store = JsonObjectStore::new(file.path());
        let objects = store.load_objects(0.5).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].class_name, "bird");
    }

    #[test]
    fn test_malformed_snapshot_is_an_error() {
        let file = write_snapshot("{not json");
        let store = JsonObjectStore::new(file.path());
        assert!(store.load_objects(0.5).is_err());
    }

    #[test]
    fn test_list_crop_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.jpg", "c.txt", "d.PNG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let paths = list_crop_images(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "d.PNG"]);
    }
}
