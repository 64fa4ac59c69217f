use std::path::Path;

use crate::action::Action;
use crate::error::Result;

/// Learned state-action value function consumed by the trainer and evaluator.
///
/// The network behind it is opaque: the engine only needs Q-values for the
/// three actions, a single optimization step on a minibatch, a weight copy
/// to a structurally identical target, and persistence.
pub trait ValueEstimator: Clone + Send {
    /// Width of the feature vector this estimator accepts.
    fn feature_dim(&self) -> usize;

    /// Q-value per action, indexed by [`Action::index`].
    fn predict(&self, state: &[f64]) -> Result<[f64; 3]>;

    fn predict_batch(&self, states: &[Vec<f64>]) -> Result<Vec<[f64; 3]>> {
        states.iter().map(|s| self.predict(s)).collect()
    }

    /// One optimization step pulling `Q(state, action)` towards `target`.
    /// Returns the minibatch loss.
    fn train_on_batch(&mut self, states: &[Vec<f64>], actions: &[Action], targets: &[f64]) -> Result<f64>;

    /// `other = blend * self + (1 - blend) * other`; `blend == 1.0` replaces outright.
    fn copy_weights_to(&self, other: &mut Self, blend: f64) -> Result<()>;

    /// Must round-trip exactly: `load(save(e))` predicts bit-identically to `e`.
    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;
}
