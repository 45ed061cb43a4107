//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "avilearn";

/// Only detections carrying this class name are eligible for the pipeline.
pub const ELIGIBLE_CLASS: &str = "bird";

/// Default minimum detector confidence for a crop to enter the pipeline.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Default batch size for embedding extraction.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// Default embedding network input edge length in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Default number of top predictions returned per image.
pub const DEFAULT_TOP_K: usize = 3;

/// Number of largest merge-distance gaps reported as threshold candidates.
pub const SUGGESTED_THRESHOLD_COUNT: usize = 5;

/// Silhouette value reported when fewer than 2 clusters exist.
///
/// Real silhouette scores live in [-1, 1]; this sentinel ranks any
/// degenerate labeling below every valid one.
pub const INVALID_SILHOUETTE: f32 = -2.0;

/// Confidence percentile reported by evaluation as the uncertain cutoff.
pub const LOW_CONFIDENCE_PERCENTILE: f64 = 20.0;

/// Standard deviation for newly added output-layer weight rows.
pub const EXPANSION_INIT_STD: f32 = 0.01;

/// ImageNet channel means used by the embedding preprocessor.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations used by the embedding preprocessor.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Training defaults shared by config and CLI.
pub mod training {
    /// Phase 1 (frozen trunk) epoch count.
    pub const PHASE1_EPOCHS: usize = 10;

    /// Phase 1 learning rate. The head starts from random init, so this
    /// is a from-scratch rate, not a fine-tuning one.
    pub const PHASE1_LR: f32 = 3e-2;

    /// Phase 1 learning-rate decay interval in epochs.
    pub const PHASE1_LR_STEP: usize = 5;

    /// Phase 2 (full fine-tune) epoch count.
    pub const PHASE2_EPOCHS: usize = 5;

    /// Phase 2 learning rate, an order of magnitude below phase 1 so the
    /// unfrozen trunk only refines what phase 1 learned.
    pub const PHASE2_LR: f32 = 3e-3;

    /// Phase 2 learning-rate decay interval in epochs.
    pub const PHASE2_LR_STEP: usize = 3;

    /// Multiplicative learning-rate decay factor.
    pub const LR_GAMMA: f32 = 0.5;

    /// Adam weight decay.
    pub const WEIGHT_DECAY: f32 = 1e-4;

    /// Default mini-batch size.
    pub const BATCH_SIZE: usize = 16;

    /// Default correction fine-tuning epoch count.
    pub const FINETUNE_EPOCHS: usize = 5;

    /// Default correction fine-tuning learning rate.
    pub const FINETUNE_LR: f32 = 1e-4;
}
