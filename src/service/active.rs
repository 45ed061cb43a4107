//! Active-learning service.
//!
//! Surfaces the model's least confident predictions for human review,
//! records corrections durably, and folds them back into the model via
//! fine-tuning. The service takes `&mut self` for every operation; a
//! single caller owns it and there is no internal locking.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::Embedder;
use crate::model::{load_checkpoint, SpeciesClassifier, TrainingHistory};
use crate::service::corrections::{CorrectionRecord, ReviewLog};
use crate::store::list_crop_images;
use crate::trainer::{predict_with_confidence, SpeciesPrediction, Trainer};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One prediction surfaced for human review.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewSample {
    /// Crop image under review.
    pub image_path: PathBuf,
    /// Winning-class confidence; samples sort ascending on this.
    pub confidence: f32,
    /// Top-k predictions to show the reviewer.
    pub predictions: Vec<SpeciesPrediction>,
}

/// Outcome of a retraining pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrainSummary {
    /// Corrections that entered fine-tuning.
    pub used: usize,
    /// Corrections dropped for referencing classes beyond capacity.
    pub dropped: usize,
    /// Model class count after retraining.
    pub n_classes: usize,
    /// Whether the model grew to accommodate new classes.
    pub expanded: bool,
}

/// Snapshot of review and model state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceStats {
    /// Corrections ever recorded, including superseded ones.
    pub total_corrections: usize,
    /// Images with at least one correction.
    pub corrected_images: usize,
    /// Images that have been through review.
    pub processed_images: usize,
    /// Distinct class ids referenced by corrections.
    pub corrected_classes: usize,
    /// Model class count, absent before first training.
    pub model_classes: Option<usize>,
    /// Fine-tuning passes applied so far, absent before first training.
    pub fine_tune_runs: Option<usize>,
    /// Last review log mutation.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Coordinates review, correction persistence, and retraining.
pub struct LearningService {
    config: Config,
    cached: Option<(SpeciesClassifier, TrainingHistory)>,
}

impl LearningService {
    /// Service over `config`; the model loads lazily on first use.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cached: None,
        }
    }

    fn ensure_model(&mut self) -> Result<()> {
        if self.cached.is_none() {
            let loaded = load_checkpoint(&self.config.paths.checkpoint_file)?;
            self.cached = Some(loaded);
        }
        Ok(())
    }

    /// Surface unreviewed crops for human review, most uncertain first.
    ///
    /// In force-manual mode every unreviewed crop surfaces regardless of
    /// confidence; otherwise only predictions at or below the uncertainty
    /// threshold do. At most `max_samples` are returned.
    pub fn get_uncertain_predictions(
        &mut self,
        embedder: &mut dyn Embedder,
    ) -> Result<Vec<ReviewSample>> {
        self.ensure_model()?;
        let log = ReviewLog::load(&self.config.paths.review_log_file)?;

        let crops = list_crop_images(&self.config.paths.objects_dir)?;
        let unreviewed: Vec<PathBuf> = crops
            .into_iter()
            .filter(|p| !log.is_processed(p))
            .collect();
        if unreviewed.is_empty() {
            info!("No unreviewed crops");
            return Ok(Vec::new());
        }

        let active = &self.config.active;
        let model = self
            .cached
            .as_ref()
            .map(|(m, _)| m)
            .ok_or_else(|| Error::ModelNotFound {
                path: self.config.paths.checkpoint_file.clone(),
            })?;

        let path_refs: Vec<&Path> = unreviewed.iter().map(PathBuf::as_path).collect();
        let predictions = predict_with_confidence(model, embedder, &path_refs, active.top_k)?;

        let mut samples: Vec<ReviewSample> = predictions
            .into_iter()
            .filter_map(|p| {
                let confidence = p.top.first().map(|t| t.confidence)?;
                Some(ReviewSample {
                    image_path: p.image_path,
                    confidence,
                    predictions: p.top,
                })
            })
            .filter(|s| active.force_manual_mode || s.confidence <= active.uncertainty_threshold)
            .collect();

        samples.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        samples.truncate(active.max_samples);

        info!(
            "{} sample(s) surfaced for review (threshold {}, manual mode {})",
            samples.len(),
            active.uncertainty_threshold,
            active.force_manual_mode
        );
        Ok(samples)
    }

    /// Record a correction durably.
    ///
    /// `original` carries the model's prediction and confidence at review
    /// time when known. The write is atomic; a crash leaves the previous
    /// log intact.
    pub fn record_correction(
        &mut self,
        image_path: &Path,
        corrected_class_id: usize,
        corrected_class_name: &str,
        original: Option<(usize, f32)>,
    ) -> Result<()> {
        let log_path = self.config.paths.review_log_file.clone();
        let mut log = ReviewLog::load(&log_path)?;
        log.record(CorrectionRecord {
            image_path: image_path.to_path_buf(),
            corrected_class_id,
            corrected_class_name: corrected_class_name.to_string(),
            original_prediction: original.map(|(id, _)| id),
            confidence_at_time: original.map(|(_, c)| c),
            timestamp: Utc::now(),
        });
        log.save(&log_path)
    }

    /// Mark an image reviewed without correction.
    pub fn confirm_prediction(&mut self, image_path: &Path) -> Result<()> {
        let log_path = self.config.paths.review_log_file.clone();
        let mut log = ReviewLog::load(&log_path)?;
        log.mark_processed(image_path);
        log.save(&log_path)
    }

    /// Fine-tune the model on all recorded corrections.
    ///
    /// Only the latest correction per image is used. Corrections naming
    /// classes beyond the model's capacity either grow the model (when
    /// configured) or are dropped with a warning. The updated checkpoint
    /// replaces the old one atomically.
    pub fn retrain_with_corrections(&mut self, embedder: &mut dyn Embedder) -> Result<RetrainSummary> {
        let log = ReviewLog::load(&self.config.paths.review_log_file)?;
        if log.corrections.is_empty() {
            return Err(Error::NoCorrections);
        }
        let latest = log.latest_by_image();

        self.ensure_model()?;
        let (mut model, history) = self.cached.take().ok_or_else(|| Error::ModelNotFound {
            path: self.config.paths.checkpoint_file.clone(),
        })?;

        let max_requested = latest
            .iter()
            .map(|c| c.corrected_class_id)
            .max()
            .unwrap_or(0);
        let mut expanded = false;
        if max_requested >= model.n_classes() {
            if self.config.active.expand_for_new_classes {
                let mut rng = StdRng::seed_from_u64(self.config.training.seed);
                model.expand_classes(max_requested + 1, &mut rng);
                expanded = true;
            } else {
                warn!(
                    "Corrections reference class ids up to {} but the model has {} classes; \
                     out-of-range corrections will be dropped (enable expand_for_new_classes to grow)",
                    max_requested,
                    model.n_classes()
                );
            }
        }

        let n_classes = model.n_classes();
        let mut pairs: Vec<(PathBuf, usize)> = Vec::with_capacity(latest.len());
        let mut dropped = 0usize;
        for correction in &latest {
            if correction.corrected_class_id < n_classes {
                model.set_class_name(
                    correction.corrected_class_id,
                    &correction.corrected_class_name,
                )?;
                pairs.push((correction.image_path.clone(), correction.corrected_class_id));
            } else {
                dropped += 1;
            }
        }
        if pairs.is_empty() {
            return Err(Error::NoValidCorrections { n_classes });
        }

        let mut trainer = Trainer::from_trained(self.config.training.clone(), model, history);
        trainer.fine_tune_with_corrections(
            embedder,
            &pairs,
            self.config.active.finetune_epochs,
            self.config.active.finetune_lr,
        )?;
        trainer.save(&self.config.paths.checkpoint_file)?;

        let used = pairs.len();
        let (model, history) = trainer.into_parts()?;
        let n_classes = model.n_classes();
        self.cached = Some((model, history));

        info!(
            "Retrained on {} correction(s), dropped {}, model now has {} classes",
            used, dropped, n_classes
        );
        Ok(RetrainSummary {
            used,
            dropped,
            n_classes,
            expanded,
        })
    }

    /// Review and model statistics.
    pub fn stats(&mut self) -> Result<ServiceStats> {
        let log = ReviewLog::load(&self.config.paths.review_log_file)?;

        let corrected_images = log.latest_by_image().len();
        let corrected_classes = log
            .corrections
            .iter()
            .map(|c| c.corrected_class_id)
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        let (model_classes, fine_tune_runs) = match self.ensure_model() {
            Ok(()) => self
                .cached
                .as_ref()
                .map_or((None, None), |(m, h)| (Some(m.n_classes()), Some(h.fine_tune_runs))),
            Err(Error::ModelNotFound { .. }) => (None, None),
            Err(e) => return Err(e),
        };

        Ok(ServiceStats {
            total_corrections: log.corrections.len(),
            corrected_images,
            processed_images: log.processed_images.len(),
            corrected_classes,
            model_classes,
            fine_tune_runs,
            last_updated: log.last_updated,
        })
    }
}
