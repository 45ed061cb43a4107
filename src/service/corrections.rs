//! Review log: recorded corrections and the processed-image set.
//!
//! The log is an append-style JSON document. Every correction ever made is
//! retained; when one image is corrected more than once, the latest entry
//! is authoritative and earlier ones remain as audit history.

use crate::error::{Error, Result};
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One human correction of a model prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Crop image the correction applies to.
    pub image_path: PathBuf,

    /// Corrected class id. The alias accepts logs written before the
    /// field was renamed.
    #[serde(alias = "correct_class_id")]
    pub corrected_class_id: usize,

    /// Corrected class name.
    #[serde(alias = "correct_class_name")]
    pub corrected_class_name: String,

    /// Class id the model predicted when the correction was made.
    #[serde(default)]
    pub original_prediction: Option<usize>,

    /// Model confidence when the correction was made.
    #[serde(default)]
    pub confidence_at_time: Option<f32>,

    /// When the correction was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Durable review state: corrections plus which images were reviewed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewLog {
    /// All corrections ever recorded, in order.
    #[serde(default)]
    pub corrections: Vec<CorrectionRecord>,

    /// Images that have been through review, corrected or confirmed.
    #[serde(default)]
    pub processed_images: BTreeSet<PathBuf>,

    /// Timestamp of the last mutation.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ReviewLog {
    /// Load the log from `path`; a missing file is an empty log.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No review log at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ReviewLogRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| Error::ReviewLogParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Persist the log to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::ArtifactSerialize {
            path: path.to_path_buf(),
            source: e,
        })?;
        write_atomic(path, json.as_bytes())
    }

    /// Append a correction and mark its image processed.
    pub fn record(&mut self, correction: CorrectionRecord) {
        info!(
            "Recording correction: {} -> {} ({})",
            correction.image_path.display(),
            correction.corrected_class_id,
            correction.corrected_class_name
        );
        self.processed_images.insert(correction.image_path.clone());
        self.corrections.push(correction);
        self.last_updated = Some(Utc::now());
    }

    /// Mark an image reviewed without a correction (prediction confirmed).
    pub fn mark_processed(&mut self, image_path: &Path) {
        self.processed_images.insert(image_path.to_path_buf());
        self.last_updated = Some(Utc::now());
    }

    /// Whether an image has already been through review.
    pub fn is_processed(&self, image_path: &Path) -> bool {
        self.processed_images.contains(image_path)
    }

    /// The authoritative correction per image: the latest one recorded.
    pub fn latest_by_image(&self) -> Vec<&CorrectionRecord> {
        let mut by_image: BTreeMap<&Path, &CorrectionRecord> = BTreeMap::new();
        for correction in &self.corrections {
            by_image.insert(correction.image_path.as_path(), correction);
        }
        by_image.into_values().collect()
    }
}
