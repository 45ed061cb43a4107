//! Human-in-the-loop review and retraining.

mod active;
mod corrections;

pub use active::{LearningService, RetrainSummary, ReviewSample, ServiceStats};
pub use corrections::{CorrectionRecord, ReviewLog};
