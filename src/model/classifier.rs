//! Species classifier head over frozen embeddings.

use crate::constants::EXPANSION_INIT_STD;
use crate::error::{Error, Result};
use crate::model::layers::{relu, relu_backward, softmax, Dense};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use tracing::info;

/// Per-layer weight and bias gradients from one backward pass.
///
/// The trunk entry is `None` while the trunk is frozen.
pub struct Gradients {
    /// Trunk adapter gradients, absent when frozen.
    pub trunk: Option<(Array2<f32>, Array1<f32>)>,
    /// Hidden layer gradients.
    pub hidden: (Array2<f32>, Array1<f32>),
    /// Output layer gradients.
    pub output: (Array2<f32>, Array1<f32>),
}

/// Intermediate activations kept for the backward pass.
struct ForwardCache {
    input: Array2<f32>,
    trunk_pre: Array2<f32>,
    trunk_act: Array2<f32>,
    hidden_pre: Array2<f32>,
    hidden_act: Array2<f32>,
    logits: Array2<f32>,
}

/// Three-layer classifier: trunk adapter, hidden layer, class logits.
///
/// The trunk adapter stands between the frozen embedding network and the
/// head; freezing it during phase 1 mirrors freezing a pretrained backbone.
/// The output layer's row count equals the class count and can be grown in
/// place without disturbing existing class weights.
#[derive(Debug, Clone)]
pub struct SpeciesClassifier {
    trunk: Dense,
    hidden: Dense,
    output: Dense,
    class_map: Vec<String>,
    trunk_frozen: bool,
}

impl SpeciesClassifier {
    /// Fresh randomly initialized classifier. The trunk starts frozen.
    pub fn new(
        feature_dim: usize,
        trunk_dim: usize,
        hidden_dim: usize,
        class_names: Vec<String>,
        rng: &mut StdRng,
    ) -> Self {
        let n_classes = class_names.len();
        Self {
            trunk: Dense::new(feature_dim, trunk_dim, rng),
            hidden: Dense::new(trunk_dim, hidden_dim, rng),
            output: Dense::new(hidden_dim, n_classes, rng),
            class_map: class_names,
            trunk_frozen: true,
        }
    }

    /// Rebuild a classifier from restored layers. The trunk is unfrozen;
    /// phase handling re-freezes it as needed.
    pub(crate) fn from_layers(trunk: Dense, hidden: Dense, output: Dense, class_map: Vec<String>) -> Self {
        Self {
            trunk,
            hidden,
            output,
            class_map,
            trunk_frozen: false,
        }
    }

    /// Number of classes the output layer currently covers.
    pub fn n_classes(&self) -> usize {
        self.output.out_dim()
    }

    /// Expected embedding dimensionality.
    pub fn feature_dim(&self) -> usize {
        self.trunk.in_dim()
    }

    /// Class id to name mapping, indexed by class id.
    pub fn class_names(&self) -> &[String] {
        &self.class_map
    }

    /// Whether the trunk adapter is currently excluded from updates.
    pub fn trunk_frozen(&self) -> bool {
        self.trunk_frozen
    }

    /// Exclude the trunk adapter from gradient updates.
    pub fn freeze_trunk(&mut self) {
        self.trunk_frozen = true;
    }

    /// Include the trunk adapter in gradient updates.
    pub fn unfreeze_trunk(&mut self) {
        self.trunk_frozen = false;
    }

    pub(crate) fn trunk(&self) -> &Dense {
        &self.trunk
    }

    pub(crate) fn hidden(&self) -> &Dense {
        &self.hidden
    }

    pub(crate) fn output(&self) -> &Dense {
        &self.output
    }

    pub(crate) fn layers_mut(&mut self) -> (&mut Dense, &mut Dense, &mut Dense) {
        (&mut self.trunk, &mut self.hidden, &mut self.output)
    }

    /// Class logits for a batch of embeddings, `(batch, n_classes)`.
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let t = relu(&self.trunk.forward(x));
        let h = relu(&self.hidden.forward(&t));
        self.output.forward(&h)
    }

    /// Class probabilities for a batch of embeddings.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        softmax(&self.forward(x))
    }

    fn forward_cached(&self, x: &Array2<f32>) -> ForwardCache {
        let trunk_pre = self.trunk.forward(x);
        let trunk_act = relu(&trunk_pre);
        let hidden_pre = self.hidden.forward(&trunk_act);
        let hidden_act = relu(&hidden_pre);
        let logits = self.output.forward(&hidden_act);
        ForwardCache {
            input: x.clone(),
            trunk_pre,
            trunk_act,
            hidden_pre,
            hidden_act,
            logits,
        }
    }

    /// Mean cross-entropy loss and per-layer gradients for one mini-batch.
    ///
    /// `targets` holds a class id per row of `x`. Trunk gradients are
    /// omitted while the trunk is frozen.
    pub fn loss_and_gradients(&self, x: &Array2<f32>, targets: &[usize]) -> (f32, Gradients) {
        let cache = self.forward_cached(x);
        let probs = softmax(&cache.logits);
        let batch = x.nrows();

        let mut loss = 0.0f32;
        for (row, &t) in probs.rows().into_iter().zip(targets) {
            loss -= row[t].max(1e-12).ln();
        }
        loss /= batch as f32;

        // Softmax cross-entropy: d logits = (probs - onehot) / batch.
        let mut dlogits = probs;
        for (mut row, &t) in dlogits.rows_mut().into_iter().zip(targets) {
            row[t] -= 1.0;
        }
        dlogits.mapv_inplace(|v| v / batch as f32);

        let (dw_out, db_out, dh_act) = self.output.backward(&cache.hidden_act, &dlogits);
        let dh_pre = relu_backward(&cache.hidden_pre, &dh_act);
        let (dw_hid, db_hid, dt_act) = self.hidden.backward(&cache.trunk_act, &dh_pre);

        let trunk_grads = if self.trunk_frozen {
            None
        } else {
            let dt_pre = relu_backward(&cache.trunk_pre, &dt_act);
            let (dw_tr, db_tr, _) = self.trunk.backward(&cache.input, &dt_pre);
            Some((dw_tr, db_tr))
        };

        (
            loss,
            Gradients {
                trunk: trunk_grads,
                hidden: (dw_hid, db_hid),
                output: (dw_out, db_out),
            },
        )
    }

    /// Grow the output layer to `new_count` classes in place.
    ///
    /// Weight rows for existing classes are copied unchanged, so their
    /// logits are bit-identical before and after. New rows get small random
    /// weights and zero bias. Growing to a count at or below the current
    /// one is a no-op. The class map is extended in the same call with
    /// `Species_N` placeholder names.
    pub fn expand_classes(&mut self, new_count: usize, rng: &mut StdRng) {
        let current = self.n_classes();
        if new_count <= current {
            return;
        }

        let hidden_dim = self.output.in_dim();
        let mut w = Array2::from_shape_fn((new_count, hidden_dim), |_| {
            Dense::small_random(rng, EXPANSION_INIT_STD)
        });
        let mut b = Array1::zeros(new_count);
        w.slice_mut(ndarray::s![..current, ..]).assign(&self.output.w);
        b.slice_mut(ndarray::s![..current]).assign(&self.output.b);
        self.output = Dense::from_weights(w, b);

        for id in current..new_count {
            self.class_map.push(format!("Species_{id}"));
        }

        info!("Expanded classifier from {} to {} classes", current, new_count);
    }

    /// Replace the placeholder name of class `class_id`.
    pub fn set_class_name(&mut self, class_id: usize, name: &str) -> Result<()> {
        let n_classes = self.n_classes();
        let slot = self
            .class_map
            .get_mut(class_id)
            .ok_or(Error::ClassOutOfRange { class_id, n_classes })?;
        *slot = name.to_string();
        Ok(())
    }
}
