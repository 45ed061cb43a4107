//! End-to-end feature extraction over the object store.

use crate::error::{Error, Result};
use crate::features::{load_crop, Embedder};
use crate::store::{ObjectRecord, ObjectStore};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array2, Axis};
use tracing::{info, warn};

/// Embeddings paired with the records they came from.
///
/// Row `i` of `embeddings` corresponds to `metadata[i]`.
pub struct ExtractedFeatures {
    /// N x D embedding matrix.
    pub embeddings: Array2<f32>,
    /// Source records, parallel to the embedding rows.
    pub metadata: Vec<ObjectRecord>,
    /// Crops skipped because the file was missing or unreadable.
    pub skipped: usize,
}

/// Runs object records through the embedding network in batches.
pub struct FeaturePipeline<'a, S: ObjectStore> {
    store: &'a S,
    embedder: &'a mut dyn Embedder,
    batch_size: usize,
}

impl<'a, S: ObjectStore> FeaturePipeline<'a, S> {
    /// Create a pipeline over `store` using `embedder`.
    pub fn new(store: &'a S, embedder: &'a mut dyn Embedder, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Load, embed, and return all eligible object crops.
    ///
    /// Missing or unreadable crop files are skipped and counted, never
    /// fatal. Fails only when no eligible records exist at all.
    pub fn extract_all_features(
        &mut self,
        min_confidence: f32,
        progress_enabled: bool,
    ) -> Result<ExtractedFeatures> {
        let records = self.store.load_objects(min_confidence)?;
        if records.is_empty() {
            return Err(Error::NoObjects { min_confidence });
        }

        info!("Extracting features from {} bird objects", records.len());
        let progress = create_progress(records.len(), progress_enabled);

        let dim = self.embedder.dim();
        let mut embeddings = Array2::<f32>::zeros((0, dim));
        let mut metadata = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for chunk in records.chunks(self.batch_size) {
            let mut images = Vec::with_capacity(chunk.len());
            let mut kept = Vec::with_capacity(chunk.len());

            for record in chunk {
                match load_crop(&record.image_path) {
                    Some(img) => {
                        images.push(img);
                        kept.push(record.clone());
                    }
                    None => skipped += 1,
                }
                if let Some(ref pb) = progress {
                    pb.inc(1);
                }
            }

            if images.is_empty() {
                continue;
            }

            let batch = self.embedder.embed_images(&images)?;
            embeddings.append(Axis(0), batch.view()).map_err(|e| Error::Internal {
                message: format!("embedding batch shape mismatch: {e}"),
            })?;
            metadata.extend(kept);
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        if skipped > 0 {
            warn!("{} crop file(s) were missing or unreadable", skipped);
        }
        info!(
            "Extracted {} embeddings of dimension {}",
            embeddings.nrows(),
            dim
        );

        Ok(ExtractedFeatures {
            embeddings,
            metadata,
            skipped,
        })
    }
}

fn create_progress(len: usize, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} crops embedded")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    Some(pb)
}
