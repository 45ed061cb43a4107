//! Correction fine-tuning.
//!
//! A short full-model training pass over corrected samples only, at a low
//! learning rate so the corrections nudge the model without erasing what
//! the initial training learned.

use crate::constants::training::WEIGHT_DECAY;
use crate::error::Result;
use crate::model::{Adam, SpeciesClassifier, TrainingHistory};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

/// Fine-tune `model` on corrected embeddings.
///
/// The trunk is unfrozen; optimizer state is fresh. Callers validate class
/// ids before this point.
pub(crate) fn fine_tune(
    model: &mut SpeciesClassifier,
    x: &Array2<f32>,
    y: &[usize],
    epochs: usize,
    lr: f32,
    batch_size: usize,
    rng: &mut StdRng,
    history: &mut TrainingHistory,
) -> Result<()> {
    model.unfreeze_trunk();

    let mut trunk_opt = Adam::for_layer(model.trunk(), WEIGHT_DECAY);
    let mut hidden_opt = Adam::for_layer(model.hidden(), WEIGHT_DECAY);
    let mut output_opt = Adam::for_layer(model.output(), WEIGHT_DECAY);

    let batch_size = batch_size.max(1);
    let mut indices: Vec<usize> = (0..y.len()).collect();

    info!(
        "Fine-tuning on {} corrected sample(s) for {} epochs (lr {:.1e})",
        y.len(),
        epochs,
        lr
    );

    for epoch in 0..epochs {
        indices.shuffle(rng);
        let mut epoch_loss = 0.0f32;
        let mut batches = 0usize;

        for batch in indices.chunks(batch_size) {
            let bx = x.select(Axis(0), batch);
            let by: Vec<usize> = batch.iter().map(|&i| y[i]).collect();

            let (loss, grads) = model.loss_and_gradients(&bx, &by);
            epoch_loss += loss;
            batches += 1;

            let (trunk, hidden, output) = model.layers_mut();
            if let Some((dw, db)) = grads.trunk {
                trunk_opt.step(trunk, &dw, &db, lr);
            }
            hidden_opt.step(hidden, &grads.hidden.0, &grads.hidden.1, lr);
            output_opt.step(output, &grads.output.0, &grads.output.1, lr);
        }

        if batches > 0 {
            info!(
                "Fine-tune epoch {}/{}: loss {:.4}",
                epoch + 1,
                epochs,
                epoch_loss / batches as f32
            );
        }
    }

    history.fine_tune_runs += 1;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_fine_tune_raises_corrected_class_confidence() {
        let mut rng = StdRng::seed_from_u64(61);
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        let mut model = SpeciesClassifier::new(4, 8, 6, names, &mut rng);

        // A fixed embedding the corrections repeatedly assert is class 1.
        let x = Array2::from_shape_fn((4, 4), |_| rng.gen_range(-0.2..0.2f32)) + 1.5;
        let y = vec![1usize; 4];

        let before = model.predict_proba(&x).column(1).mean().unwrap_or(0.0);
        let mut history = TrainingHistory::default();
        fine_tune(&mut model, &x, &y, 30, 1e-3, 4, &mut rng, &mut history).unwrap();
        let after = model.predict_proba(&x).column(1).mean().unwrap_or(0.0);

        assert!(
            after > before,
            "class-1 confidence went from {before} to {after}"
        );
        assert_eq!(history.fine_tune_runs, 1);
    }

    #[test]
    fn test_each_run_increments_history_counter() {
        let mut rng = StdRng::seed_from_u64(62);
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        let mut model = SpeciesClassifier::new(4, 8, 6, names, &mut rng);
        let x = Array2::from_shape_fn((2, 4), |_| rng.gen_range(-1.0..1.0f32));
        let y = vec![0usize, 1];

        let mut history = TrainingHistory::default();
        fine_tune(&mut model, &x, &y, 2, 1e-4, 2, &mut rng, &mut history).unwrap();
        fine_tune(&mut model, &x, &y, 2, 1e-4, 2, &mut rng, &mut history).unwrap();
        assert_eq!(history.fine_tune_runs, 2);
    }
}
