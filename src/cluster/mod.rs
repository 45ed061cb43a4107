//! Hierarchical agglomerative clustering over embeddings.
//!
//! Clustering turns unlabeled crops into pseudo-labels for initial
//! supervised training. The distance-threshold stopping rule replaces a
//! fixed cluster count, so the number of discovered species falls out of
//! the data.

mod engine;
mod experiment;
mod linkage;
mod metrics;

pub use engine::{standardize, ClusterEngine, ClusterRun, DendrogramAnalysis, DistanceStats};
pub use experiment::{write_summary_csv, ClusteringExperiment, ExperimentResult};
pub use linkage::{cut_at_threshold, linkage_matrix, Linkage, Merge};
pub use metrics::{evaluate_labeling, silhouette_score, ClusterMetrics};
