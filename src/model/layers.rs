//! Dense layers, activations, and the Adam optimizer.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Fully connected layer; weights are `(out, in)`.
#[derive(Debug, Clone)]
pub struct Dense {
    /// Weight matrix.
    pub w: Array2<f32>,
    /// Bias vector.
    pub b: Array1<f32>,
}

impl Dense {
    /// He-initialized layer.
    pub fn new(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let std = (2.0 / in_dim as f32).sqrt();
        let normal = Normal::new(0.0, std).unwrap_or_else(|_| {
            // std is always positive and finite for in_dim >= 1
            Normal::new(0.0, 1e-3).unwrap_or_else(|_| unreachable!())
        });
        let w = Array2::from_shape_fn((out_dim, in_dim), |_| normal.sample(rng));
        Self {
            w,
            b: Array1::zeros(out_dim),
        }
    }

    /// Layer with explicitly provided weights (checkpoint restore).
    pub fn from_weights(w: Array2<f32>, b: Array1<f32>) -> Self {
        Self { w, b }
    }

    /// Input width.
    pub fn in_dim(&self) -> usize {
        self.w.ncols()
    }

    /// Output width.
    pub fn out_dim(&self) -> usize {
        self.w.nrows()
    }

    /// Forward pass; `x` is `(batch, in)`, output `(batch, out)`.
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.w.t());
        y += &self.b;
        y
    }

    /// Gradients for `y = x W^T + b` given upstream `dy`.
    ///
    /// Returns `(dw, db, dx)`.
    pub fn backward(
        &self,
        x: &Array2<f32>,
        dy: &Array2<f32>,
    ) -> (Array2<f32>, Array1<f32>, Array2<f32>) {
        let dw = dy.t().dot(x);
        let db = dy.sum_axis(Axis(0));
        let dx = dy.dot(&self.w);
        (dw, db, dx)
    }

    /// Sample a small random value for expansion-initialized weights.
    pub fn small_random(rng: &mut StdRng, std: f32) -> f32 {
        Normal::new(0.0, std)
            .map(|n| n.sample(rng))
            .unwrap_or_else(|_| rng.gen_range(-std..std))
    }
}

/// Elementwise rectified linear activation.
pub fn relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| v.max(0.0))
}

/// Gradient of relu given the pre-activation values.
pub fn relu_backward(pre: &Array2<f32>, dact: &Array2<f32>) -> Array2<f32> {
    let mut dx = dact.clone();
    dx.zip_mut_with(pre, |d, &p| {
        if p <= 0.0 {
            *d = 0.0;
        }
    });
    dx
}

/// Row-wise softmax with the usual max-subtraction for stability.
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Adam optimizer state for one dense layer.
#[derive(Debug, Clone)]
pub struct Adam {
    m_w: Array2<f32>,
    v_w: Array2<f32>,
    m_b: Array1<f32>,
    v_b: Array1<f32>,
    t: i32,
    weight_decay: f32,
}

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

impl Adam {
    /// Fresh optimizer state sized for `layer`.
    pub fn for_layer(layer: &Dense, weight_decay: f32) -> Self {
        Self {
            m_w: Array2::zeros(layer.w.raw_dim()),
            v_w: Array2::zeros(layer.w.raw_dim()),
            m_b: Array1::zeros(layer.b.raw_dim()),
            v_b: Array1::zeros(layer.b.raw_dim()),
            t: 0,
            weight_decay,
        }
    }

    /// Apply one update step to `layer`.
    pub fn step(&mut self, layer: &mut Dense, dw: &Array2<f32>, db: &Array1<f32>, lr: f32) {
        self.t += 1;
        let bc1 = 1.0 - BETA1.powi(self.t);
        let bc2 = 1.0 - BETA2.powi(self.t);

        // L2 weight decay folded into the weight gradient (biases exempt).
        let dw = dw + &(layer.w.mapv(|w| w * self.weight_decay));

        self.m_w.zip_mut_with(&dw, |m, &g| *m = BETA1 * *m + (1.0 - BETA1) * g);
        self.v_w.zip_mut_with(&dw, |v, &g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);
        self.m_b.zip_mut_with(db, |m, &g| *m = BETA1 * *m + (1.0 - BETA1) * g);
        self.v_b.zip_mut_with(db, |v, &g| *v = BETA2 * *v + (1.0 - BETA2) * g * g);

        ndarray::Zip::from(&mut layer.w)
            .and(&self.m_w)
            .and(&self.v_w)
            .for_each(|w, &m, &v| {
                *w -= lr * (m / bc1) / ((v / bc2).sqrt() + EPS);
            });
        ndarray::Zip::from(&mut layer.b)
            .and(&self.m_b)
            .and(&self.v_b)
            .for_each(|b, &m, &v| {
                *b -= lr * (m / bc1) / ((v / bc2).sqrt() + EPS);
            });
    }
}
