//! Agglomerative linkage computation and dendrogram cutting.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Cluster-distance rule used during hierarchical merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Merge cost = increase in total within-cluster variance.
    /// Compact, variance-minimizing clusters; Euclidean only.
    Ward,
    /// Merge cost = mean pairwise distance between members.
    /// More tolerant of non-spherical clusters.
    Average,
}

impl std::fmt::Display for Linkage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ward => write!(f, "ward"),
            Self::Average => write!(f, "average"),
        }
    }
}

/// One merge step in the dendrogram.
///
/// Cluster ids follow the usual convention: ids `0..n` are the input
/// points, and the merge created at step `t` is cluster `n + t`. The step
/// is carried explicitly so consumers never have to re-derive the created
/// id from a merge's position in a (possibly re-ordered) list.
#[derive(Debug, Clone, Copy)]
pub struct Merge {
    /// First merged cluster id.
    pub a: usize,
    /// Second merged cluster id.
    pub b: usize,
    /// Linkage distance at which the merge happened.
    pub distance: f32,
    /// Member count of the new cluster.
    pub size: usize,
    /// Creation step; this merge creates cluster `n + step`.
    pub step: usize,
}

/// Compute the full linkage (dendrogram) for `data`, one row per point.
///
/// Returns `n - 1` merges ordered by increasing distance. Ward updates run
/// on squared Euclidean distances via the Lance-Williams recurrence and
/// report the square root, matching the scale of the raw point distances.
pub fn linkage_matrix(data: ArrayView2<'_, f32>, linkage: Linkage) -> Vec<Merge> {
    let n = data.nrows();
    if n < 2 {
        return Vec::new();
    }

    // Working distances: squared for Ward, plain for Average. Both are
    // monotonic in the reported distance, so min selection is unaffected.
    let mut dist = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let mut d2 = 0.0f32;
            for k in 0..data.ncols() {
                let diff = data[[i, k]] - data[[j, k]];
                d2 += diff * diff;
            }
            let d = match linkage {
                Linkage::Ward => d2,
                Linkage::Average => d2.sqrt(),
            };
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    // Slot bookkeeping: merged clusters reuse the lower slot.
    let mut active = vec![true; n];
    let mut size = vec![1usize; n];
    let mut cluster_id: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..(n - 1) {
        // Find the closest active pair.
        let mut best = (0usize, 0usize, f32::INFINITY);
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if active[j] && dist[i][j] < best.2 {
                    best = (i, j, dist[i][j]);
                }
            }
        }
        let (i, j, w) = best;

        let distance = match linkage {
            Linkage::Ward => w.sqrt(),
            Linkage::Average => w,
        };
        let merged_size = size[i] + size[j];
        merges.push(Merge {
            a: cluster_id[i],
            b: cluster_id[j],
            distance,
            size: merged_size,
            step,
        });

        // Lance-Williams update of slot i against every other active slot.
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let (ni, nj, nk) = (size[i] as f32, size[j] as f32, size[k] as f32);
            let updated = match linkage {
                Linkage::Ward => {
                    ((ni + nk) * dist[i][k] + (nj + nk) * dist[j][k] - nk * w) / (ni + nj + nk)
                }
                Linkage::Average => (ni * dist[i][k] + nj * dist[j][k]) / (ni + nj),
            };
            dist[i][k] = updated;
            dist[k][i] = updated;
        }

        active[j] = false;
        size[i] = merged_size;
        cluster_id[i] = n + step;
    }

    merges.sort_by(|x, y| {
        x.distance
            .partial_cmp(&y.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merges
}

/// Cut the dendrogram at `threshold`, assigning every point to a cluster.
///
/// Merges with distance strictly below the threshold are applied; labels
/// are renumbered `0..k` in order of first appearance. Hierarchical
/// clustering leaves no unassigned points. Each applied merge links its
/// children to the cluster id recorded in [`Merge::step`], so the result
/// does not depend on the ordering of `merges`.
pub fn cut_at_threshold(merges: &[Merge], n_points: usize, threshold: f32) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..(2 * n_points)).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for merge in merges {
        if merge.distance >= threshold {
            continue;
        }
        let new_id = n_points + merge.step;
        let ra = find(&mut parent, merge.a);
        let rb = find(&mut parent, merge.b);
        parent[ra] = new_id;
        parent[rb] = new_id;
    }

    let mut labels = Vec::with_capacity(n_points);
    let mut relabel = std::collections::HashMap::new();
    for point in 0..n_points {
        let root = find(&mut parent, point);
        let next = relabel.len();
        let label = *relabel.entry(root).or_insert(next);
        labels.push(label);
    }
    labels
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_two_singletons_merge_at_euclidean_distance() {
        let data = array![[0.0, 0.0], [3.0, 4.0]];
        for linkage in [Linkage::Ward, Linkage::Average] {
            let merges = linkage_matrix(data.view(), linkage);
            assert_eq!(merges.len(), 1);
            assert!((merges[0].distance - 5.0).abs() < 1e-5);
            assert_eq!(merges[0].size, 2);
        }
    }

    #[test]
    fn test_merge_distances_nondecreasing() {
        let data = array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [10.0, 0.0]
        ];
        for linkage in [Linkage::Ward, Linkage::Average] {
            let merges = linkage_matrix(data.view(), linkage);
            assert_eq!(merges.len(), 5);
            for pair in merges.windows(2) {
                assert!(pair[0].distance <= pair[1].distance + 1e-6);
            }
        }
    }

    #[test]
    fn test_cut_below_smallest_merge_keeps_singletons() {
        let data = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let merges = linkage_matrix(data.view(), Linkage::Average);
        let labels = cut_at_threshold(&merges, 3, 0.5);
        let distinct: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn test_cut_above_largest_merge_yields_one_cluster() {
        let data = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let merges = linkage_matrix(data.view(), Linkage::Average);
        let labels = cut_at_threshold(&merges, 3, 100.0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_cut_separates_two_groups() {
        let data = array![[0.0, 0.0], [0.2, 0.0], [9.0, 9.0], [9.2, 9.0]];
        let merges = linkage_matrix(data.view(), Linkage::Ward);
        let labels = cut_at_threshold(&merges, 4, 3.0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_later_merges_reference_the_created_cluster_id() {
        // Chained merges: the second merge must reference cluster
        // n + merges[0].step, and the cut must honor those ids even if
        // the merge list is reordered.
        let data = array![[0.0, 0.0], [1.0, 0.0], [2.1, 0.0]];
        let mut merges = linkage_matrix(data.view(), Linkage::Average);
        assert_eq!(merges[0].step, 0);
        assert_eq!(merges[1].step, 1);
        assert!(merges[1].a == 3 || merges[1].b == 3);

        merges.reverse();
        let labels = cut_at_threshold(&merges, 3, 100.0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_every_point_assigned() {
        let data = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [8.0, 8.0]];
        let merges = linkage_matrix(data.view(), Linkage::Average);
        let labels = cut_at_threshold(&merges, 4, 2.5);
        assert_eq!(labels.len(), 4);
        // Labels are renumbered 0..k with no gaps.
        let max = *labels.iter().max().unwrap();
        for l in 0..=max {
            assert!(labels.contains(&l));
        }
    }
}
