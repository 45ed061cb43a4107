//! Multi-configuration clustering experiments.
//!
//! Runs both linkage variants at three preset thresholds each and scores
//! the six labelings for "plausible species count". All weights, bonuses,
//! penalties, and ranges come from configuration.

use crate::cluster::{ClusterEngine, ClusterRun, Linkage};
use crate::config::{ClusteringConfig, ScoringConfig};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info};

/// One scored experiment configuration.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    /// Human-readable configuration name, e.g. `ward_balanced`.
    pub name: String,
    /// Linkage variant used.
    pub linkage: Linkage,
    /// Distance threshold used.
    pub threshold: f32,
    /// The labeling and its metrics.
    pub run: ClusterRun,
    /// Heuristic score; degenerate labelings rank last.
    pub score: f32,
}

/// Runs and ranks the six preset clustering configurations.
pub struct ClusteringExperiment {
    clustering: ClusteringConfig,
    scoring: ScoringConfig,
}

impl ClusteringExperiment {
    /// Create an experiment harness from configuration.
    pub fn new(clustering: ClusteringConfig, scoring: ScoringConfig) -> Self {
        Self {
            clustering,
            scoring,
        }
    }

    /// Run all configurations against a fitted engine.
    ///
    /// Configurations run sequentially; they are independent, so this is a
    /// throughput choice, not a correctness requirement.
    pub fn run_all(&self, engine: &ClusterEngine) -> Vec<ExperimentResult> {
        let presets = [
            ("ward_conservative", Linkage::Ward, self.clustering.ward.conservative),
            ("ward_balanced", Linkage::Ward, self.clustering.ward.balanced),
            ("ward_permissive", Linkage::Ward, self.clustering.ward.permissive),
            (
                "average_conservative",
                Linkage::Average,
                self.clustering.average.conservative,
            ),
            ("average_balanced", Linkage::Average, self.clustering.average.balanced),
            (
                "average_permissive",
                Linkage::Average,
                self.clustering.average.permissive,
            ),
        ];

        let mut results = Vec::with_capacity(presets.len());
        for (name, linkage, threshold) in presets {
            let run = engine.fit_predict(linkage, threshold);
            let score = self.score(linkage, &run);
            debug!(
                "Experiment {}: {} cluster(s), silhouette {:.3}, score {:.3}",
                name, run.metrics.n_clusters, run.metrics.silhouette, score
            );
            results.push(ExperimentResult {
                name: name.to_string(),
                linkage,
                threshold,
                run,
                score,
            });
        }
        results
    }

    /// Pick the highest-scoring non-degenerate labeling.
    pub fn best<'a>(&self, results: &'a [ExperimentResult]) -> Result<&'a ExperimentResult> {
        let best = results
            .iter()
            .filter(|r| !r.run.metrics.degenerate)
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or(Error::NoUsableClustering)?;

        info!(
            "Best clustering: {} ({} species, silhouette {:.3}, score {:.3})",
            best.name, best.run.metrics.n_clusters, best.run.metrics.silhouette, best.score
        );
        Ok(best)
    }

    fn score(&self, linkage: Linkage, run: &ClusterRun) -> f32 {
        let s = &self.scoring;
        let n = run.metrics.n_clusters;

        let mut score = run.metrics.silhouette * s.silhouette_weight;

        if n < s.min_species {
            score += s.too_few_penalty;
        } else if n > s.max_species {
            score += s.too_many_penalty;
        } else if (s.sweet_spot_min..=s.sweet_spot_max).contains(&n) {
            score += s.sweet_spot_bonus;
        }

        if linkage == Linkage::Ward {
            score += s.ward_bonus;
        }

        score
    }
}

/// Write a CSV summary of experiment results.
pub fn write_summary_csv(results: &[ExperimentResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["method", "threshold", "n_clusters", "silhouette", "score", "status"])?;
    for r in results {
        let status = if r.run.metrics.degenerate {
            "degenerate"
        } else {
            "ok"
        };
        writer.write_record([
            r.name.clone(),
            format!("{:.2}", r.threshold),
            r.run.metrics.n_clusters.to_string(),
            format!("{:.4}", r.run.metrics.silhouette),
            format!("{:.4}", r.score),
            status.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Internal {
            message: format!("CSV write failed: {e}"),
        }
    }
}
