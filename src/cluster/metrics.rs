//! Clustering quality metrics.

use crate::constants::INVALID_SILHOUETTE;
use ndarray::ArrayView2;
use serde::Serialize;

/// Quality summary for one labeling.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClusterMetrics {
    /// Number of distinct clusters.
    pub n_clusters: usize,
    /// Number of labeled points.
    pub n_points: usize,
    /// Silhouette score, or [`INVALID_SILHOUETTE`] when degenerate.
    pub silhouette: f32,
    /// True when fewer than 2 clusters resulted.
    pub degenerate: bool,
}

/// Evaluate a labeling over standardized features.
///
/// Fewer than 2 distinct labels is reported as degenerate metrics, never an
/// error, so the experiment harness can rank that configuration last.
pub fn evaluate_labeling(features: ArrayView2<'_, f32>, labels: &[usize]) -> ClusterMetrics {
    let n_clusters = labels.iter().collect::<std::collections::HashSet<_>>().len();
    let degenerate = n_clusters < 2;

    let silhouette = if degenerate {
        INVALID_SILHOUETTE
    } else {
        silhouette_score(features, labels)
    };

    ClusterMetrics {
        n_clusters,
        n_points: labels.len(),
        silhouette,
        degenerate,
    }
}

/// Mean silhouette coefficient over all points.
///
/// For each point: `a` is the mean distance to its own cluster's other
/// members, `b` the smallest mean distance to another cluster, and the
/// coefficient is `(b - a) / max(a, b)`. Singleton-cluster points score 0.
pub fn silhouette_score(features: ArrayView2<'_, f32>, labels: &[usize]) -> f32 {
    let n = labels.len();
    if n == 0 {
        return INVALID_SILHOUETTE;
    }

    let n_clusters = labels.iter().max().map_or(0, |m| m + 1);
    let mut cluster_sizes = vec![0usize; n_clusters];
    for &l in labels {
        cluster_sizes[l] += 1;
    }

    let mut total = 0.0f64;
    for i in 0..n {
        if cluster_sizes[labels[i]] == 1 {
            continue; // silhouette of a singleton is 0
        }

        // Mean distance from point i to each cluster.
        let mut sums = vec![0.0f64; n_clusters];
        for j in 0..n {
            if i == j {
                continue;
            }
            let mut d2 = 0.0f32;
            for k in 0..features.ncols() {
                let diff = features[[i, k]] - features[[j, k]];
                d2 += diff * diff;
            }
            sums[labels[j]] += f64::from(d2.sqrt());
        }

        let own = labels[i];
        let a = sums[own] / (cluster_sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && cluster_sizes[c] > 0)
            .map(|c| sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    (total / n as f64) as f32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_well_separated_clusters_score_high() {
        let features = array![
            [0.0, 0.0],
            [0.1, 0.1],
            [0.0, 0.1],
            [10.0, 10.0],
            [10.1, 10.0],
            [10.0, 10.1]
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let score = silhouette_score(features.view(), &labels);
        assert!(score > 0.9, "expected near-perfect separation, got {score}");
    }

    #[test]
    fn test_mixed_clusters_score_low() {
        let features = array![[0.0, 0.0], [10.0, 10.0], [0.1, 0.1], [10.1, 10.1]];
        // Deliberately wrong assignment across the two real groups.
        let labels = vec![0, 0, 1, 1];
        let score = silhouette_score(features.view(), &labels);
        assert!(score < 0.0, "expected negative silhouette, got {score}");
    }

    #[test]
    fn test_single_cluster_is_degenerate() {
        let features = array![[0.0, 0.0], [1.0, 1.0]];
        let metrics = evaluate_labeling(features.view(), &[0, 0]);
        assert!(metrics.degenerate);
        assert_eq!(metrics.n_clusters, 1);
        assert_eq!(metrics.silhouette, INVALID_SILHOUETTE);
    }

    #[test]
    fn test_valid_labeling_reports_counts() {
        let features = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]];
        let metrics = evaluate_labeling(features.view(), &[0, 0, 1, 1]);
        assert!(!metrics.degenerate);
        assert_eq!(metrics.n_clusters, 2);
        assert_eq!(metrics.n_points, 4);
        assert!(metrics.silhouette > 0.5);
    }
}
