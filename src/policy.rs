use rand::Rng;

use crate::action::Action;
use crate::error::{FdsError, Result};
use crate::traits::ValueEstimator;

/// Highest-valued action. Ties go to the lowest ordinal and NaN never wins.
pub fn argmax_action(values: &[f64; 3]) -> Action {
    let mut best = Action::Approve;
    let mut best_value = values[0];
    for action in [Action::ManualReview, Action::Block] {
        let value = values[action.index()];
        if value > best_value || (best_value.is_nan() && !value.is_nan()) {
            best = action;
            best_value = value;
        }
    }
    best
}

/// Random action with probability `epsilon`, otherwise the estimator's argmax.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpsilonGreedy {
    pub epsilon: f64,
}

impl EpsilonGreedy {
    /// Fails with `Config` unless `epsilon` is in [0, 1].
    pub fn new(epsilon: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(FdsError::Config(format!("epsilon {} outside [0, 1]", epsilon)));
        }
        Ok(Self { epsilon })
    }

    pub fn greedy() -> Self {
        Self { epsilon: 0.0 }
    }

    /// Draws exactly one uniform per call, plus one index draw when exploring,
    /// so a seeded stream replays identically.
    pub fn select<E: ValueEstimator, R: Rng + ?Sized>(
        &self,
        estimator: &E,
        state: &[f64],
        rng: &mut R,
    ) -> Result<Action> {
        let explore = self.epsilon > 0.0 && rng.gen::<f64>() < self.epsilon;
        if explore {
            return Ok(Action::ALL[rng.gen_range(0..Action::COUNT)]);
        }
        Ok(argmax_action(&estimator.predict(state)?))
    }

    pub fn select_batch<E: ValueEstimator, R: Rng + ?Sized>(
        &self,
        estimator: &E,
        states: &[Vec<f64>],
        rng: &mut R,
    ) -> Result<Vec<Action>> {
        states
            .iter()
            .map(|state| self.select(estimator, state, rng))
            .collect()
    }
}
