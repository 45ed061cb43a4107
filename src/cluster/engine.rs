//! Cluster engine: standardization, threshold runs, dendrogram analysis.

use crate::cluster::{
    cut_at_threshold, evaluate_labeling, linkage_matrix, ClusterMetrics, Linkage, Merge,
};
use crate::constants::SUGGESTED_THRESHOLD_COUNT;
use crate::error::{Error, Result};
use ndarray::{Array2, Axis};
use serde::Serialize;
use tracing::{debug, info};

/// One clustering run: labels plus quality metrics.
#[derive(Debug, Clone)]
pub struct ClusterRun {
    /// Cluster label per input row, renumbered `0..k`.
    pub labels: Vec<usize>,
    /// Quality metrics for the labeling.
    pub metrics: ClusterMetrics,
}

/// Summary statistics of the dendrogram merge distances.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DistanceStats {
    /// Smallest merge distance.
    pub min: f32,
    /// Largest merge distance.
    pub max: f32,
    /// Mean merge distance.
    pub mean: f32,
    /// Standard deviation of merge distances.
    pub std: f32,
}

/// Dendrogram analysis used for threshold tuning.
///
/// A large gap between consecutive sorted merge distances is a natural cut
/// point: many small merges happen below it, then clustering stalls before
/// one giant merge.
#[derive(Debug, Clone)]
pub struct DendrogramAnalysis {
    /// Linkage variant the dendrogram was computed with.
    pub linkage: Linkage,
    /// Candidate thresholds at the largest gaps, ascending.
    pub suggested_thresholds: Vec<f32>,
    /// Merge-distance summary statistics.
    pub stats: DistanceStats,
    /// Full merge history.
    pub merges: Vec<Merge>,
}

/// Standardize embeddings to zero mean and unit variance per dimension.
///
/// Dimensions with (near) zero variance are left unscaled.
pub fn standardize(embeddings: &Array2<f32>) -> Array2<f32> {
    let mean = embeddings
        .mean_axis(Axis(0))
        .unwrap_or_else(|| ndarray::Array1::zeros(embeddings.ncols()));
    let std = embeddings.std_axis(Axis(0), 0.0);
    let std = std.mapv(|s| if s < 1e-12 { 1.0 } else { s });

    let mut scaled = embeddings.clone();
    for mut row in scaled.rows_mut() {
        row -= &mean;
        row /= &std;
    }
    scaled
}

/// Clustering over a fixed, standardized embedding set.
pub struct ClusterEngine {
    scaled: Array2<f32>,
}

impl ClusterEngine {
    /// Standardize `embeddings` and prepare for clustering runs.
    ///
    /// Empty input is caller misuse and fails explicitly.
    pub fn fit(embeddings: &Array2<f32>) -> Result<Self> {
        if embeddings.nrows() == 0 {
            return Err(Error::EmptyEmbeddings);
        }
        debug!(
            "Standardizing {} embeddings of dimension {}",
            embeddings.nrows(),
            embeddings.ncols()
        );
        Ok(Self {
            scaled: standardize(embeddings),
        })
    }

    /// The standardized feature matrix.
    pub fn features(&self) -> &Array2<f32> {
        &self.scaled
    }

    /// Cluster with the given linkage, stopping at `distance_threshold`.
    ///
    /// Every input point receives a label; fewer than 2 resulting clusters
    /// is reported via degenerate metrics, not an error.
    pub fn fit_predict(&self, linkage: Linkage, distance_threshold: f32) -> ClusterRun {
        let merges = linkage_matrix(self.scaled.view(), linkage);
        let labels = cut_at_threshold(&merges, self.scaled.nrows(), distance_threshold);
        let metrics = evaluate_labeling(self.scaled.view(), &labels);

        info!(
            "{} linkage at threshold {:.2}: {} cluster(s) over {} points",
            linkage, distance_threshold, metrics.n_clusters, metrics.n_points
        );

        ClusterRun { labels, metrics }
    }

    /// Compute the dendrogram and suggest thresholds at the largest gaps.
    pub fn dendrogram(&self, linkage: Linkage) -> Result<DendrogramAnalysis> {
        let merges = linkage_matrix(self.scaled.view(), linkage);
        if merges.is_empty() {
            return Err(Error::ClusteringInput {
                message: "dendrogram analysis needs at least 2 points".to_string(),
            });
        }

        let mut distances: Vec<f32> = merges.iter().map(|m| m.distance).collect();
        distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let stats = distance_stats(&distances);

        // Rank gaps between consecutive sorted distances; the lower edge of
        // each top gap is a candidate threshold.
        let mut gaps: Vec<(f32, usize)> = distances
            .windows(2)
            .enumerate()
            .map(|(i, w)| (w[1] - w[0], i))
            .collect();
        gaps.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut suggested: Vec<f32> = gaps
            .iter()
            .take(SUGGESTED_THRESHOLD_COUNT)
            .map(|&(_, i)| distances[i])
            .collect();
        suggested.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            "{} linkage dendrogram: distances {:.3}..{:.3}, {} suggested thresholds",
            linkage,
            stats.min,
            stats.max,
            suggested.len()
        );

        Ok(DendrogramAnalysis {
            linkage,
            suggested_thresholds: suggested,
            stats,
            merges,
        })
    }
}

fn distance_stats(sorted: &[f32]) -> DistanceStats {
    let n = sorted.len() as f32;
    let mean = sorted.iter().sum::<f32>() / n;
    let var = sorted.iter().map(|d| (d - mean) * (d - mean)).sum::<f32>() / n;
    DistanceStats {
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
        mean,
        std: var.sqrt(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// 30 points in 3 tight, well-separated groups of 10.
    fn three_cluster_embeddings() -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(7);
        let centers = [[0.0f32, 0.0, 0.0], [20.0, 0.0, 0.0], [0.0, 20.0, 0.0]];
        let mut data = Array2::zeros((30, 3));
        for (i, mut row) in data.rows_mut().into_iter().enumerate() {
            let c = centers[i / 10];
            for (k, v) in row.iter_mut().enumerate() {
                *v = c[k] + rng.gen_range(-0.5..0.5);
            }
        }
        data
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let data = three_cluster_embeddings();
        let scaled = standardize(&data);
        let mean = scaled.mean_axis(Axis(0)).unwrap();
        let std = scaled.std_axis(Axis(0), 0.0);
        for k in 0..3 {
            assert!(mean[k].abs() < 1e-4);
            assert!((std[k] - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_empty_input_is_explicit_error() {
        let empty = Array2::<f32>::zeros((0, 4));
        assert!(matches!(
            ClusterEngine::fit(&empty),
            Err(Error::EmptyEmbeddings)
        ));
    }

    #[test]
    fn test_ward_recovers_three_clusters() {
        let engine = ClusterEngine::fit(&three_cluster_embeddings()).unwrap();
        // Standardization inflates the jitter-only third dimension, so the
        // last intra-group Ward merges land near 4.3 while the inter-group
        // ones start near 6.8; 5.0 sits in the plateau between them.
        let run = engine.fit_predict(Linkage::Ward, 5.0);

        assert_eq!(run.metrics.n_clusters, 3);
        assert!(run.metrics.silhouette > 0.5);
        assert_eq!(run.labels.len(), 30);
        // Each group of 10 shares one label.
        for group in 0..3 {
            let first = run.labels[group * 10];
            assert!(run.labels[group * 10..(group + 1) * 10]
                .iter()
                .all(|&l| l == first));
        }
    }

    #[test]
    fn test_huge_threshold_is_degenerate_not_error() {
        let engine = ClusterEngine::fit(&three_cluster_embeddings()).unwrap();
        let run = engine.fit_predict(Linkage::Ward, 1e6);
        assert_eq!(run.metrics.n_clusters, 1);
        assert!(run.metrics.degenerate);
    }

    #[test]
    fn test_dendrogram_suggests_threshold_between_groups() {
        let engine = ClusterEngine::fit(&three_cluster_embeddings()).unwrap();
        let analysis = engine.dendrogram(Linkage::Ward).unwrap();

        assert!(!analysis.suggested_thresholds.is_empty());
        assert!(analysis.stats.min <= analysis.stats.mean);
        assert!(analysis.stats.mean <= analysis.stats.max);

        // At least one suggested threshold separates intra-group merges
        // from the two inter-group merges.
        let cut = analysis
            .suggested_thresholds
            .iter()
            .any(|&t| engine.fit_predict(Linkage::Ward, t * 1.01).metrics.n_clusters == 3);
        assert!(cut, "no suggested threshold recovered the 3 groups");
    }
}
