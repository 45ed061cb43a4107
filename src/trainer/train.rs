//! Mini-batch training loop shared by both phases.

use crate::constants::training::{LR_GAMMA, WEIGHT_DECAY};
use crate::error::Result;
use crate::model::{Adam, SpeciesClassifier, TrainingHistory};
use crate::trainer::dataset::Dataset;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

/// One training phase: epochs, schedule, and trunk freezing.
pub(crate) struct Phase {
    pub name: &'static str,
    pub epochs: usize,
    pub lr: f32,
    pub lr_step: usize,
    pub freeze_trunk: bool,
}

/// Run one phase over the prepared dataset, appending per-epoch metrics
/// to `history`.
///
/// Optimizer state is fresh per phase; the learning rate halves every
/// `lr_step` epochs within the phase.
pub(crate) fn run_phase(
    model: &mut SpeciesClassifier,
    data: &Dataset,
    phase: &Phase,
    batch_size: usize,
    rng: &mut StdRng,
    history: &mut TrainingHistory,
) -> Result<()> {
    if phase.freeze_trunk {
        model.freeze_trunk();
    } else {
        model.unfreeze_trunk();
    }

    let mut trunk_opt = Adam::for_layer(model.trunk(), WEIGHT_DECAY);
    let mut hidden_opt = Adam::for_layer(model.hidden(), WEIGHT_DECAY);
    let mut output_opt = Adam::for_layer(model.output(), WEIGHT_DECAY);

    let batch_size = batch_size.max(1);
    let step = phase.lr_step.max(1);
    let mut indices: Vec<usize> = (0..data.train_y.len()).collect();

    info!(
        "{}: {} epochs over {} samples (trunk {})",
        phase.name,
        phase.epochs,
        indices.len(),
        if phase.freeze_trunk { "frozen" } else { "trainable" }
    );

    for epoch in 0..phase.epochs {
        let lr = phase.lr * LR_GAMMA.powi((epoch / step) as i32);
        indices.shuffle(rng);

        for batch in indices.chunks(batch_size) {
            let bx = data.train_x.select(Axis(0), batch);
            let by: Vec<usize> = batch.iter().map(|&i| data.train_y[i]).collect();

            let (_, grads) = model.loss_and_gradients(&bx, &by);
            let (trunk, hidden, output) = model.layers_mut();
            if let Some((dw, db)) = grads.trunk {
                trunk_opt.step(trunk, &dw, &db, lr);
            }
            hidden_opt.step(hidden, &grads.hidden.0, &grads.hidden.1, lr);
            output_opt.step(output, &grads.output.0, &grads.output.1, lr);
        }

        let (train_loss, train_acc) = evaluate_split(model, &data.train_x, &data.train_y);
        history.train_loss.push(train_loss);
        history.train_accuracy.push(train_acc);

        if data.val_y.is_empty() {
            debug!(
                "{} epoch {}/{}: loss {:.4}, acc {:.3} (lr {:.1e})",
                phase.name,
                epoch + 1,
                phase.epochs,
                train_loss,
                train_acc,
                lr
            );
        } else {
            let (val_loss, val_acc) = evaluate_split(model, &data.val_x, &data.val_y);
            history.val_loss.push(val_loss);
            history.val_accuracy.push(val_acc);
            debug!(
                "{} epoch {}/{}: loss {:.4}, acc {:.3}, val loss {:.4}, val acc {:.3} (lr {:.1e})",
                phase.name,
                epoch + 1,
                phase.epochs,
                train_loss,
                train_acc,
                val_loss,
                val_acc,
                lr
            );
        }
    }

    Ok(())
}

/// Mean cross-entropy loss and accuracy of `model` over one split.
pub(crate) fn evaluate_split(
    model: &SpeciesClassifier,
    x: &Array2<f32>,
    y: &[usize],
) -> (f32, f32) {
    if y.is_empty() {
        return (0.0, 0.0);
    }
    let probs = model.predict_proba(x);
    let mut loss = 0.0f32;
    let mut correct = 0usize;
    for (row, &target) in probs.rows().into_iter().zip(y) {
        loss -= row[target].max(1e-12).ln();
        let predicted = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(0, |(i, _)| i);
        if predicted == target {
            correct += 1;
        }
    }
    (loss / y.len() as f32, correct as f32 / y.len() as f32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::constants::training::{PHASE1_LR, PHASE1_LR_STEP};
    use rand::{Rng, SeedableRng};

    /// Two linearly separable Gaussian blobs in embedding space.
    fn separable_dataset(rng: &mut StdRng) -> Dataset {
        let n_per = 30;
        let mut x = Array2::zeros((n_per * 2, 4));
        let mut y = Vec::with_capacity(n_per * 2);
        for i in 0..n_per * 2 {
            let class = i / n_per;
            let center = if class == 0 { -2.0 } else { 2.0 };
            for k in 0..4 {
                x[[i, k]] = center + rng.gen_range(-0.5..0.5f32);
            }
            y.push(class);
        }
        Dataset {
            train_x: x.clone(),
            train_y: y.clone(),
            val_x: Array2::zeros((0, 4)),
            val_y: vec![],
            test_x: x,
            test_y: y,
            n_classes: 2,
        }
    }

    #[test]
    fn test_phase_training_learns_separable_classes() {
        let mut rng = StdRng::seed_from_u64(41);
        let data = separable_dataset(&mut rng);
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        let mut model = SpeciesClassifier::new(4, 8, 6, names, &mut rng);
        let mut history = TrainingHistory::default();

        let phase = Phase {
            name: "phase 1",
            epochs: 15,
            lr: PHASE1_LR,
            lr_step: PHASE1_LR_STEP,
            freeze_trunk: true,
        };
        run_phase(&mut model, &data, &phase, 8, &mut rng, &mut history).unwrap();

        let (_, acc) = evaluate_split(&model, &data.test_x, &data.test_y);
        assert!(acc > 0.9, "accuracy after training was {acc}");
        assert_eq!(history.train_loss.len(), 15);
        assert!(history.val_loss.is_empty());
    }

    #[test]
    fn test_loss_decreases_over_training() {
        let mut rng = StdRng::seed_from_u64(42);
        let data = separable_dataset(&mut rng);
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        let mut model = SpeciesClassifier::new(4, 8, 6, names, &mut rng);
        let mut history = TrainingHistory::default();

        let phase = Phase {
            name: "phase 1",
            epochs: 10,
            lr: PHASE1_LR,
            lr_step: PHASE1_LR_STEP,
            freeze_trunk: true,
        };
        run_phase(&mut model, &data, &phase, 8, &mut rng, &mut history).unwrap();

        let first = history.train_loss[0];
        let last = *history.train_loss.last().unwrap();
        assert!(last < first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_frozen_trunk_weights_do_not_move() {
        let mut rng = StdRng::seed_from_u64(43);
        let data = separable_dataset(&mut rng);
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        let mut model = SpeciesClassifier::new(4, 8, 6, names, &mut rng);
        let trunk_before = model.trunk().w.clone();
        let mut history = TrainingHistory::default();

        let phase = Phase {
            name: "phase 1",
            epochs: 3,
            lr: PHASE1_LR,
            lr_step: PHASE1_LR_STEP,
            freeze_trunk: true,
        };
        run_phase(&mut model, &data, &phase, 8, &mut rng, &mut history).unwrap();

        assert_eq!(model.trunk().w, trunk_before);
    }
}
