//! Two-phase transfer-learning trainer.
//!
//! The trainer walks a fixed lifecycle: prepare data, train with the trunk
//! frozen, unfreeze and fine-tune, evaluate, then optionally apply
//! correction fine-tuning any number of times. Calling an operation before
//! its prerequisite state is an explicit error, never a silent no-op.

mod augment;
mod dataset;
mod evaluate;
mod finetune;
mod predict;
mod train;

pub use dataset::{prepare_dataset, Dataset};
pub use evaluate::{evaluate_model, ClassReport, EvaluationReport};
pub use predict::{predict_with_confidence, ImagePrediction, SpeciesPrediction};

use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::features::{load_crop, Embedder};
use crate::model::{save_checkpoint, SpeciesClassifier, TrainingHistory};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use train::Phase;
use tracing::warn;

/// Trainer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// No data prepared yet.
    Uninitialized,
    /// Splits are embedded and ready.
    DataPrepared,
    /// Frozen-trunk phase finished.
    Phase1Trained,
    /// Full fine-tuning phase finished.
    Phase2Trained,
    /// Held-out evaluation has run.
    Evaluated,
    /// At least one correction fine-tuning pass applied.
    FineTuned,
}

impl TrainerState {
    fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::DataPrepared => "DataPrepared",
            Self::Phase1Trained => "Phase1Trained",
            Self::Phase2Trained => "Phase2Trained",
            Self::Evaluated => "Evaluated",
            Self::FineTuned => "FineTuned",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::DataPrepared => 1,
            Self::Phase1Trained => 2,
            Self::Phase2Trained => 3,
            Self::Evaluated => 4,
            Self::FineTuned => 5,
        }
    }
}

/// Drives the two-phase training lifecycle over a [`SpeciesClassifier`].
pub struct Trainer {
    config: TrainingConfig,
    state: TrainerState,
    dataset: Option<Dataset>,
    model: Option<SpeciesClassifier>,
    history: TrainingHistory,
    rng: StdRng,
}

impl Trainer {
    /// Fresh trainer; the config seed drives splits, init, and shuffling.
    pub fn new(config: TrainingConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: TrainerState::Uninitialized,
            dataset: None,
            model: None,
            history: TrainingHistory::default(),
            rng,
        }
    }

    /// Trainer wrapping an already trained model, e.g. loaded from a
    /// checkpoint for correction fine-tuning.
    pub fn from_trained(
        config: TrainingConfig,
        model: SpeciesClassifier,
        history: TrainingHistory,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: TrainerState::Phase2Trained,
            dataset: None,
            model: Some(model),
            history,
            rng,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Accumulated training history.
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// The trained model, available from phase 1 onward.
    pub fn model(&self) -> Result<&SpeciesClassifier> {
        self.model.as_ref().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::Phase1Trained.name(),
        })
    }

    /// Consume the trainer, yielding the model and its history.
    pub fn into_parts(self) -> Result<(SpeciesClassifier, TrainingHistory)> {
        let state = self.state;
        match self.model {
            Some(model) => Ok((model, self.history)),
            None => Err(Error::TrainerState {
                actual: state.name(),
                required: TrainerState::Phase1Trained.name(),
            }),
        }
    }

    fn require(&self, required: TrainerState) -> Result<()> {
        if self.state.rank() < required.rank() {
            return Err(Error::TrainerState {
                actual: self.state.name(),
                required: required.name(),
            });
        }
        Ok(())
    }

    /// Embed `samples` into train/validation/test splits.
    pub fn prepare_data(
        &mut self,
        embedder: &mut dyn Embedder,
        samples: &[(PathBuf, usize)],
    ) -> Result<()> {
        let dataset = prepare_dataset(embedder, samples, &self.config, &mut self.rng)?;
        self.dataset = Some(dataset);
        self.state = TrainerState::DataPrepared;
        Ok(())
    }

    /// Phase 1: train the head with the trunk adapter frozen.
    pub fn train_phase1(&mut self) -> Result<()> {
        self.require(TrainerState::DataPrepared)?;
        let data = self.dataset.as_ref().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::DataPrepared.name(),
        })?;

        if self.model.is_none() {
            let names = (0..data.n_classes).map(|i| format!("Species_{i}")).collect();
            self.model = Some(SpeciesClassifier::new(
                data.train_x.ncols(),
                self.config.trunk_dim,
                self.config.hidden_dim,
                names,
                &mut self.rng,
            ));
        }
        let model = self.model.as_mut().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::DataPrepared.name(),
        })?;

        let phase = Phase {
            name: "phase 1",
            epochs: self.config.phase1_epochs,
            lr: self.config.phase1_lr,
            lr_step: crate::constants::training::PHASE1_LR_STEP,
            freeze_trunk: true,
        };
        train::run_phase(model, data, &phase, self.config.batch_size, &mut self.rng, &mut self.history)?;
        self.state = TrainerState::Phase1Trained;
        Ok(())
    }

    /// Phase 2: unfreeze the trunk and fine-tune the whole model.
    pub fn train_phase2(&mut self) -> Result<()> {
        self.require(TrainerState::Phase1Trained)?;
        let data = self.dataset.as_ref().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::DataPrepared.name(),
        })?;
        let model = self.model.as_mut().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::Phase1Trained.name(),
        })?;

        let phase = Phase {
            name: "phase 2",
            epochs: self.config.phase2_epochs,
            lr: self.config.phase2_lr,
            lr_step: crate::constants::training::PHASE2_LR_STEP,
            freeze_trunk: false,
        };
        train::run_phase(model, data, &phase, self.config.batch_size, &mut self.rng, &mut self.history)?;
        self.state = TrainerState::Phase2Trained;
        Ok(())
    }

    /// Evaluate on the held-out test partition.
    pub fn evaluate(&mut self) -> Result<EvaluationReport> {
        self.require(TrainerState::Phase2Trained)?;
        let data = self.dataset.as_ref().ok_or(Error::DatasetPrepare {
            message: "no dataset available for evaluation".to_string(),
        })?;
        let model = self.model.as_ref().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::Phase2Trained.name(),
        })?;

        let report = evaluate_model(model, &data.test_x, &data.test_y);
        if self.state == TrainerState::Phase2Trained {
            self.state = TrainerState::Evaluated;
        }
        Ok(report)
    }

    /// Apply a correction fine-tuning pass.
    ///
    /// Corrections with class ids beyond the model's capacity are dropped
    /// with a warning; if none survive, the call fails rather than training
    /// on nothing. Callers that want new species must expand the model
    /// before fine-tuning.
    pub fn fine_tune_with_corrections(
        &mut self,
        embedder: &mut dyn Embedder,
        corrections: &[(PathBuf, usize)],
        epochs: usize,
        lr: f32,
    ) -> Result<()> {
        self.require(TrainerState::Phase2Trained)?;
        if corrections.is_empty() {
            return Err(Error::NoCorrections);
        }
        let n_classes = self.model()?.n_classes();

        let mut images = Vec::with_capacity(corrections.len());
        let mut labels = Vec::with_capacity(corrections.len());
        for (path, class_id) in corrections {
            if *class_id >= n_classes {
                warn!(
                    "Dropping correction for {}: class id {} exceeds model capacity {}",
                    path.display(),
                    class_id,
                    n_classes
                );
                continue;
            }
            match load_crop(path) {
                Some(img) => {
                    images.push(img);
                    labels.push(*class_id);
                }
                None => warn!("Dropping correction with unreadable image {}", path.display()),
            }
        }
        if labels.is_empty() {
            return Err(Error::NoValidCorrections { n_classes });
        }

        let x = dataset::embed_all(embedder, &images)?;
        let model = self.model.as_mut().ok_or(Error::TrainerState {
            actual: self.state.name(),
            required: TrainerState::Phase2Trained.name(),
        })?;
        finetune::fine_tune(
            model,
            &x,
            &labels,
            epochs,
            lr,
            self.config.batch_size,
            &mut self.rng,
            &mut self.history,
        )?;
        self.state = TrainerState::FineTuned;
        Ok(())
    }

    /// Grow the model's class capacity in place.
    pub fn expand_model_classes(&mut self, new_count: usize) -> Result<()> {
        self.require(TrainerState::Phase2Trained)?;
        let actual = self.state.name();
        let rng = &mut self.rng;
        let model = self.model.as_mut().ok_or(Error::TrainerState {
            actual,
            required: TrainerState::Phase2Trained.name(),
        })?;
        model.expand_classes(new_count, rng);
        Ok(())
    }

    /// Top-k predictions for crop images.
    pub fn predict_with_confidence(
        &self,
        embedder: &mut dyn Embedder,
        paths: &[&Path],
        top_k: usize,
    ) -> Result<Vec<ImagePrediction>> {
        predict::predict_with_confidence(self.model()?, embedder, paths, top_k)
    }

    /// Persist the trained model and history atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        save_checkpoint(self.model()?, &self.history, path)
    }
}
