//! Held-out evaluation of a trained classifier.

use crate::constants::LOW_CONFIDENCE_PERCENTILE;
use crate::model::SpeciesClassifier;
use ndarray::Array2;
use serde::Serialize;
use tracing::info;

/// Precision/recall for one class present in the test partition.
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    /// Class id.
    pub class_id: usize,
    /// Class name at evaluation time.
    pub name: String,
    /// Precision over the test partition.
    pub precision: f32,
    /// Recall over the test partition.
    pub recall: f32,
    /// Number of test samples with this true class.
    pub support: usize,
}

/// Evaluation summary over the test partition.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Overall accuracy.
    pub accuracy: f32,
    /// Per-class breakdown, only for classes present in the test set.
    pub per_class: Vec<ClassReport>,
    /// Mean winning-class confidence.
    pub mean_confidence: f32,
    /// 20th percentile of winning-class confidence. Predictions below
    /// this are the natural review candidates.
    pub low_confidence_cutoff: f32,
    /// Test partition size.
    pub n_test: usize,
}

/// Evaluate `model` on a labeled embedding set.
pub fn evaluate_model(
    model: &SpeciesClassifier,
    x: &Array2<f32>,
    y: &[usize],
) -> EvaluationReport {
    let probs = model.predict_proba(x);
    let n_classes = model.n_classes();

    let mut correct = 0usize;
    let mut confidences: Vec<f32> = Vec::with_capacity(y.len());
    // Per class: true positives, predicted count, actual count.
    let mut tp = vec![0usize; n_classes];
    let mut predicted = vec![0usize; n_classes];
    let mut actual = vec![0usize; n_classes];

    for (row, &target) in probs.rows().into_iter().zip(y) {
        let (pred, conf) = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map_or((0, 0.0), |(i, &p)| (i, p));

        confidences.push(conf);
        predicted[pred] += 1;
        actual[target] += 1;
        if pred == target {
            correct += 1;
            tp[pred] += 1;
        }
    }

    let per_class = (0..n_classes)
        .filter(|&c| actual[c] > 0)
        .map(|c| ClassReport {
            class_id: c,
            name: model
                .class_names()
                .get(c)
                .cloned()
                .unwrap_or_else(|| format!("Species_{c}")),
            precision: if predicted[c] > 0 {
                tp[c] as f32 / predicted[c] as f32
            } else {
                0.0
            },
            recall: tp[c] as f32 / actual[c] as f32,
            support: actual[c],
        })
        .collect();

    let n = y.len();
    let accuracy = if n > 0 { correct as f32 / n as f32 } else { 0.0 };
    let mean_confidence = if n > 0 {
        confidences.iter().sum::<f32>() / n as f32
    } else {
        0.0
    };
    let low_confidence_cutoff = percentile(&mut confidences, LOW_CONFIDENCE_PERCENTILE);

    info!(
        "Evaluation: accuracy {:.3} over {} test samples, mean confidence {:.3}",
        accuracy, n, mean_confidence
    );

    EvaluationReport {
        accuracy,
        per_class,
        mean_confidence,
        low_confidence_cutoff,
        n_test: n,
    }
}

/// Linearly interpolated percentile; sorts `values` in place.
fn percentile(values: &mut [f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = p / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    values[lo] + (values[hi] - values[lo]) * frac
}
