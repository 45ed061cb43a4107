//! Top-k prediction over crop images.

use crate::error::Result;
use crate::features::{load_crop, Embedder};
use crate::model::SpeciesClassifier;
use crate::trainer::dataset::embed_all;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One ranked class prediction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SpeciesPrediction {
    /// Predicted class id.
    pub class_id: usize,
    /// Class name at prediction time.
    pub class_name: String,
    /// Softmax confidence.
    pub confidence: f32,
}

/// Top-k predictions for one crop image.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImagePrediction {
    /// Source crop path.
    pub image_path: PathBuf,
    /// Predictions sorted by descending confidence, at most k entries.
    pub top: Vec<SpeciesPrediction>,
}

/// Predict species for each readable image in `paths`.
///
/// Unreadable images are skipped with a warning; the result holds one
/// entry per image that could be loaded, in input order.
pub fn predict_with_confidence(
    model: &SpeciesClassifier,
    embedder: &mut dyn Embedder,
    paths: &[&Path],
    top_k: usize,
) -> Result<Vec<ImagePrediction>> {
    let mut images = Vec::with_capacity(paths.len());
    let mut kept_paths: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        match load_crop(path) {
            Some(img) => {
                images.push(img);
                kept_paths.push(path.to_path_buf());
            }
            None => warn!("Skipping unreadable image {}", path.display()),
        }
    }
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = embed_all(embedder, &images)?;
    let probs = model.predict_proba(&embeddings);
    let k = top_k.max(1).min(model.n_classes());

    let mut predictions = Vec::with_capacity(kept_paths.len());
    for (row, image_path) in probs.rows().into_iter().zip(kept_paths) {
        let mut ranked: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        let top = ranked
            .into_iter()
            .map(|(class_id, confidence)| SpeciesPrediction {
                class_id,
                class_name: model
                    .class_names()
                    .get(class_id)
                    .cloned()
                    .unwrap_or_else(|| format!("Species_{class_id}")),
                confidence,
            })
            .collect();

        predictions.push(ImagePrediction { image_path, top });
    }
    Ok(predictions)
}
