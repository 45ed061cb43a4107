//! Feature extraction: object crops to embedding vectors.

mod embedder;
mod pipeline;

pub use embedder::{load_crop, Embedder, OnnxEmbedder};
pub use pipeline::{ExtractedFeatures, FeaturePipeline};
