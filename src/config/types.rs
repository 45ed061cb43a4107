//! Configuration type definitions.

use crate::constants::{
    DEFAULT_EMBED_BATCH_SIZE, DEFAULT_INPUT_SIZE, DEFAULT_MIN_CONFIDENCE, DEFAULT_TOP_K, training,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feature extraction settings.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Clustering settings.
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Experiment scoring settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Training settings.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Active-learning settings.
    #[serde(default)]
    pub active: ActiveConfig,

    /// Data and artifact paths.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Path to the ONNX embedding model.
    pub model_path: Option<PathBuf>,

    /// Minimum detector confidence for a crop to be embedded.
    pub min_confidence: f32,

    /// Embedding batch size.
    pub batch_size: usize,

    /// Embedding network input edge length in pixels.
    pub input_size: u32,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Three preset distance thresholds for one linkage variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkageThresholds {
    /// Tight threshold, produces more clusters.
    pub conservative: f32,
    /// Middle-ground threshold.
    pub balanced: f32,
    /// Loose threshold, produces fewer clusters.
    pub permissive: f32,
}

impl Default for LinkageThresholds {
    fn default() -> Self {
        Self {
            conservative: 50.0,
            balanced: 75.0,
            permissive: 90.0,
        }
    }
}

/// Clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Ward linkage thresholds.
    pub ward: LinkageThresholds,

    /// Average linkage thresholds.
    pub average: LinkageThresholds,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            ward: LinkageThresholds::default(),
            average: LinkageThresholds {
                conservative: 45.0,
                balanced: 70.0,
                permissive: 85.0,
            },
        }
    }
}

/// Experiment scoring settings.
///
/// These drive the heuristic that picks the most plausible species count
/// among the experiment labelings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Hard lower bound on plausible species count.
    pub min_species: usize,
    /// Hard upper bound on plausible species count.
    pub max_species: usize,
    /// Lower edge of the preferred species-count range.
    pub sweet_spot_min: usize,
    /// Upper edge of the preferred species-count range.
    pub sweet_spot_max: usize,
    /// Multiplier applied to the silhouette score.
    pub silhouette_weight: f32,
    /// Bonus for a species count inside the sweet spot.
    pub sweet_spot_bonus: f32,
    /// Small bonus for Ward linkage labelings.
    pub ward_bonus: f32,
    /// Penalty for fewer species than `min_species`.
    pub too_few_penalty: f32,
    /// Penalty for more species than `max_species`.
    pub too_many_penalty: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_species: 2,
            max_species: 10,
            sweet_spot_min: 2,
            sweet_spot_max: 6,
            silhouette_weight: 1.0,
            sweet_spot_bonus: 0.1,
            ward_bonus: 0.05,
            too_few_penalty: -1.0,
            too_many_penalty: -0.5,
        }
    }
}

/// Training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Phase 1 (frozen trunk) epoch count.
    pub phase1_epochs: usize,
    /// Phase 1 learning rate.
    pub phase1_lr: f32,
    /// Phase 2 (full fine-tune) epoch count.
    pub phase2_epochs: usize,
    /// Phase 2 learning rate.
    pub phase2_lr: f32,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Fraction of samples held out for testing.
    pub test_size: f32,
    /// Fraction of samples held out for validation.
    pub val_size: f32,
    /// Augmented copies generated per training image.
    pub augment_copies: usize,
    /// Trunk adapter width.
    pub trunk_dim: usize,
    /// Hidden head width.
    pub hidden_dim: usize,
    /// RNG seed for splits, init, and augmentation.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            phase1_epochs: training::PHASE1_EPOCHS,
            phase1_lr: training::PHASE1_LR,
            phase2_epochs: training::PHASE2_EPOCHS,
            phase2_lr: training::PHASE2_LR,
            batch_size: training::BATCH_SIZE,
            test_size: 0.2,
            val_size: 0.1,
            augment_copies: 2,
            trunk_dim: 512,
            hidden_dim: 128,
            seed: 42,
        }
    }
}

/// Active-learning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveConfig {
    /// Predictions at or below this max confidence surface for review.
    pub uncertainty_threshold: f32,
    /// Surface every unprocessed sample regardless of confidence.
    pub force_manual_mode: bool,
    /// Maximum samples returned per review request.
    pub max_samples: usize,
    /// Top-k predictions attached to each review sample.
    pub top_k: usize,
    /// Grow the model when corrections reference unseen class ids.
    pub expand_for_new_classes: bool,
    /// Correction fine-tuning epoch count.
    pub finetune_epochs: usize,
    /// Correction fine-tuning learning rate.
    pub finetune_lr: f32,
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: 0.95,
            force_manual_mode: false,
            max_samples: 20,
            top_k: DEFAULT_TOP_K,
            expand_for_new_classes: false,
            finetune_epochs: training::FINETUNE_EPOCHS,
            finetune_lr: training::FINETUNE_LR,
        }
    }
}

/// Data and artifact paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding object crop images.
    pub objects_dir: PathBuf,
    /// JSON snapshot of object records exported by the metadata store.
    pub metadata_file: PathBuf,
    /// Model checkpoint file.
    pub checkpoint_file: PathBuf,
    /// Review log file (corrections + processed images).
    pub review_log_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            objects_dir: PathBuf::from("data/objects"),
            metadata_file: PathBuf::from("data/objects.json"),
            checkpoint_file: PathBuf::from("data/classifier.json"),
            review_log_file: PathBuf::from("data/corrections.json"),
        }
    }
}
