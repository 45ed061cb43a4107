//! Model checkpoint persistence.
//!
//! Checkpoints are JSON documents written atomically (temp file plus
//! rename), so a crash mid-write leaves the previous checkpoint intact.

use crate::error::{Error, Result};
use crate::model::classifier::SpeciesClassifier;
use crate::model::layers::Dense;
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Checkpoint format version; bumped on incompatible layout changes.
const FORMAT_VERSION: u32 = 1;

/// Loss and accuracy curves accumulated across training runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Per-epoch training loss.
    #[serde(default)]
    pub train_loss: Vec<f32>,
    /// Per-epoch training accuracy.
    #[serde(default)]
    pub train_accuracy: Vec<f32>,
    /// Per-epoch validation loss.
    #[serde(default)]
    pub val_loss: Vec<f32>,
    /// Per-epoch validation accuracy.
    #[serde(default)]
    pub val_accuracy: Vec<f32>,
    /// Number of correction fine-tuning runs applied after initial training.
    #[serde(default)]
    pub fine_tune_runs: usize,
}

/// Flattened weights of one dense layer.
#[derive(Debug, Serialize, Deserialize)]
struct LayerWeights {
    out_dim: usize,
    in_dim: usize,
    w: Vec<f32>,
    b: Vec<f32>,
}

impl LayerWeights {
    fn from_dense(layer: &Dense) -> Self {
        Self {
            out_dim: layer.out_dim(),
            in_dim: layer.in_dim(),
            w: layer.w.iter().copied().collect(),
            b: layer.b.to_vec(),
        }
    }

    fn into_dense(self, path: &Path, name: &str) -> Result<Dense> {
        if self.w.len() != self.out_dim * self.in_dim || self.b.len() != self.out_dim {
            return Err(Error::CheckpointInvalid {
                path: path.to_path_buf(),
                message: format!(
                    "{name} layer claims {}x{} but carries {} weights and {} biases",
                    self.out_dim,
                    self.in_dim,
                    self.w.len(),
                    self.b.len()
                ),
            });
        }
        let w = Array2::from_shape_vec((self.out_dim, self.in_dim), self.w).map_err(|e| {
            Error::CheckpointInvalid {
                path: path.to_path_buf(),
                message: format!("{name} layer weights malformed: {e}"),
            }
        })?;
        Ok(Dense::from_weights(w, Array1::from_vec(self.b)))
    }
}

/// On-disk checkpoint document.
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    format_version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    class_map: Vec<String>,
    trunk: LayerWeights,
    hidden: LayerWeights,
    output: LayerWeights,
    history: TrainingHistory,
}

/// Serialize `model` and `history` to `path`, atomically replacing any
/// existing checkpoint. The previous file's creation time is preserved.
pub fn save_checkpoint(
    model: &SpeciesClassifier,
    history: &TrainingHistory,
    path: &Path,
) -> Result<()> {
    let now = Utc::now();
    let created_at = read_created_at(path).unwrap_or(now);

    let checkpoint = Checkpoint {
        format_version: FORMAT_VERSION,
        created_at,
        updated_at: now,
        class_map: model.class_names().to_vec(),
        trunk: LayerWeights::from_dense(model.trunk()),
        hidden: LayerWeights::from_dense(model.hidden()),
        output: LayerWeights::from_dense(model.output()),
        history: history.clone(),
    };

    let json = serde_json::to_string_pretty(&checkpoint).map_err(|e| Error::ArtifactSerialize {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_atomic(path, json.as_bytes())?;

    info!(
        "Saved checkpoint with {} classes to {}",
        model.n_classes(),
        path.display()
    );
    Ok(())
}

/// Load a checkpoint from `path`.
///
/// A missing file maps to [`Error::ModelNotFound`]; shape mismatches
/// between layers are rejected before a model is constructed.
pub fn load_checkpoint(path: &Path) -> Result<(SpeciesClassifier, TrainingHistory)> {
    if !path.exists() {
        return Err(Error::ModelNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| Error::CheckpointRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let checkpoint: Checkpoint =
        serde_json::from_str(&contents).map_err(|e| Error::CheckpointParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    if checkpoint.format_version != FORMAT_VERSION {
        return Err(Error::CheckpointInvalid {
            path: path.to_path_buf(),
            message: format!(
                "format version {} is not supported (expected {FORMAT_VERSION})",
                checkpoint.format_version
            ),
        });
    }

    let trunk = checkpoint.trunk.into_dense(path, "trunk")?;
    let hidden = checkpoint.hidden.into_dense(path, "hidden")?;
    let output = checkpoint.output.into_dense(path, "output")?;

    if trunk.out_dim() != hidden.in_dim() || hidden.out_dim() != output.in_dim() {
        return Err(Error::CheckpointInvalid {
            path: path.to_path_buf(),
            message: "layer dimensions do not chain".to_string(),
        });
    }
    if checkpoint.class_map.len() != output.out_dim() {
        return Err(Error::CheckpointInvalid {
            path: path.to_path_buf(),
            message: format!(
                "class map has {} names but the output layer has {} classes",
                checkpoint.class_map.len(),
                output.out_dim()
            ),
        });
    }

    let model = SpeciesClassifier::from_layers(trunk, hidden, output, checkpoint.class_map);
    Ok((model, checkpoint.history))
}

fn read_created_at(path: &Path) -> Option<DateTime<Utc>> {
    let contents = std::fs::read_to_string(path).ok()?;
    let checkpoint: Checkpoint = serde_json::from_str(&contents).ok()?;
    Some(checkpoint.created_at)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_model(rng: &mut StdRng) -> SpeciesClassifier {
        let names = vec!["Species_0".to_string(), "Species_1".to_string()];
        SpeciesClassifier::new(6, 5, 4, names, rng)
    }

    #[test]
    fn test_save_load_round_trip_preserves_predictions() {
        let mut rng = StdRng::seed_from_u64(21);
        let model = sample_model(&mut rng);
        let x = Array2::from_shape_fn((4, 6), |_| Dense::small_random(&mut rng, 1.0));
        let before = model.predict_proba(&x);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        save_checkpoint(&model, &TrainingHistory::default(), &path).unwrap();

        let (restored, history) = load_checkpoint(&path).unwrap();
        let after = restored.predict_proba(&x);

        assert_eq!(before, after);
        assert_eq!(restored.class_names(), model.class_names());
        assert_eq!(history.fine_tune_runs, 0);
    }

    #[test]
    fn test_missing_checkpoint_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            load_checkpoint(&path),
            Err(Error::ModelNotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_checkpoint_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_checkpoint(&path),
            Err(Error::CheckpointParse { .. })
        ));
    }

    #[test]
    fn test_mismatched_class_map_is_rejected() {
        let mut rng = StdRng::seed_from_u64(22);
        let model = sample_model(&mut rng);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        save_checkpoint(&model, &TrainingHistory::default(), &path).unwrap();

        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["class_map"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!("Species_extra"));
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        assert!(matches!(
            load_checkpoint(&path),
            Err(Error::CheckpointInvalid { .. })
        ));
    }

    #[test]
    fn test_resave_preserves_created_at() {
        let mut rng = StdRng::seed_from_u64(23);
        let model = sample_model(&mut rng);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        save_checkpoint(&model, &TrainingHistory::default(), &path).unwrap();

        let first: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        save_checkpoint(&model, &TrainingHistory::default(), &path).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(first["created_at"], second["created_at"]);
    }
}
