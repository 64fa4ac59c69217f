//! Reference [`ValueEstimator`]: one linear head per action.
//!
//! Good enough to exercise the trainer, checkpointing and evaluation end to
//! end. Production deployments plug their own network in behind the trait.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::checkpoint::write_atomic;
use crate::error::{FdsError, Result};
use crate::traits::ValueEstimator;

const ESTIMATOR_FORMAT: &str = "linear-q/1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearQConfig {
    pub learning_rate: f64,
    pub huber_delta: f64,
    /// Global L2 norm ceiling on each step's gradient.
    pub grad_clip: f64,
    pub init_scale: f64,
    pub seed: u64,
}

impl Default for LinearQConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            huber_delta: 1.0,
            grad_clip: 10.0,
            init_scale: 0.01,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct LinearHead {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearHead {
    fn value(&self, state: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(state)
            .fold(self.bias, |acc, (w, x)| acc + w * x)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearQEstimator {
    format: String,
    feature_dim: usize,
    config: LinearQConfig,
    heads: Vec<LinearHead>,
}

impl LinearQEstimator {
    pub fn new(feature_dim: usize, config: LinearQConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let scale = config.init_scale;
        let heads = Action::ALL
            .iter()
            .map(|_| LinearHead {
                weights: (0..feature_dim)
                    .map(|_| if scale > 0.0 { rng.gen_range(-scale..scale) } else { 0.0 })
                    .collect(),
                bias: 0.0,
            })
            .collect();
        Self {
            format: ESTIMATOR_FORMAT.to_string(),
            feature_dim,
            config,
            heads,
        }
    }

    pub fn config(&self) -> &LinearQConfig {
        &self.config
    }

    fn check_state(&self, state: &[f64]) -> Result<()> {
        if state.len() != self.feature_dim {
            return Err(FdsError::Estimator(format!(
                "state has {} features, estimator expects {}",
                state.len(),
                self.feature_dim
            )));
        }
        Ok(())
    }

    fn huber(&self, err: f64) -> (f64, f64) {
        let delta = self.config.huber_delta;
        if err.abs() <= delta {
            (0.5 * err * err, err)
        } else {
            (delta * (err.abs() - 0.5 * delta), delta * err.signum())
        }
    }
}

impl ValueEstimator for LinearQEstimator {
    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn predict(&self, state: &[f64]) -> Result<[f64; 3]> {
        self.check_state(state)?;
        let mut q = [0.0; 3];
        for action in Action::ALL {
            q[action.index()] = self.heads[action.index()].value(state);
        }
        Ok(q)
    }

    fn train_on_batch(&mut self, states: &[Vec<f64>], actions: &[Action], targets: &[f64]) -> Result<f64> {
        if states.len() != actions.len() || states.len() != targets.len() {
            return Err(FdsError::Estimator(format!(
                "batch columns disagree: {} states, {} actions, {} targets",
                states.len(),
                actions.len(),
                targets.len()
            )));
        }
        if states.is_empty() {
            return Ok(0.0);
        }

        let n = states.len() as f64;
        let mut grad_w = vec![vec![0.0; self.feature_dim]; Action::COUNT];
        let mut grad_b = [0.0; 3];
        let mut loss = 0.0;
        for ((state, action), target) in states.iter().zip(actions).zip(targets) {
            self.check_state(state)?;
            let a = action.index();
            let err = self.heads[a].value(state) - target;
            let (l, g) = self.huber(err);
            loss += l;
            for (gw, x) in grad_w[a].iter_mut().zip(state) {
                *gw += g * x / n;
            }
            grad_b[a] += g / n;
        }

        let norm = grad_w
            .iter()
            .flatten()
            .chain(grad_b.iter())
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt();
        let clip = if norm > self.config.grad_clip && norm > 0.0 {
            self.config.grad_clip / norm
        } else {
            1.0
        };

        let lr = self.config.learning_rate * clip;
        for (head, (gw, gb)) in self.heads.iter_mut().zip(grad_w.iter().zip(grad_b)) {
            for (w, g) in head.weights.iter_mut().zip(gw) {
                *w -= lr * g;
            }
            head.bias -= lr * gb;
        }
        Ok(loss / n)
    }

    fn copy_weights_to(&self, other: &mut Self, blend: f64) -> Result<()> {
        if !(blend > 0.0 && blend <= 1.0) {
            return Err(FdsError::Config(format!("blend factor {} outside (0, 1]", blend)));
        }
        if other.feature_dim != self.feature_dim {
            return Err(FdsError::Estimator(format!(
                "cannot copy weights from dim {} into dim {}",
                self.feature_dim, other.feature_dim
            )));
        }
        if blend == 1.0 {
            other.heads = self.heads.clone();
            return Ok(());
        }
        for (dst, src) in other.heads.iter_mut().zip(&self.heads) {
            for (d, s) in dst.weights.iter_mut().zip(&src.weights) {
                *d = blend * s + (1.0 - blend) * *d;
            }
            dst.bias = blend * src.bias + (1.0 - blend) * dst.bias;
        }
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let estimator: LinearQEstimator = serde_json::from_slice(&content)?;
        if estimator.format != ESTIMATOR_FORMAT {
            return Err(FdsError::Estimator(format!(
                "unsupported estimator format '{}'",
                estimator.format
            )));
        }
        if estimator.heads.len() != Action::COUNT
            || estimator.heads.iter().any(|h| h.weights.len() != estimator.feature_dim)
        {
            return Err(FdsError::Estimator("weight shapes do not match feature_dim".into()));
        }
        Ok(estimator)
    }
}
