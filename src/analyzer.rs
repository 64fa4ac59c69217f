use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{FdsError, Result};
use crate::reward::RewardFunction;

/// Default grid size for threshold discovery.
pub const DEFAULT_THRESHOLD_RESOLUTION: usize = 10_000;

/// Optimal action and per-action expected reward along a probability sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionBoundaries {
    pub amount: f64,
    pub fraud_probabilities: Vec<f64>,
    pub optimal_actions: Vec<Action>,
    /// Keyed by action name; each vector is aligned with `fraud_probabilities`.
    pub expected_rewards: BTreeMap<String, Vec<f64>>,
}

/// A point where the reward-maximizing action changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTransition {
    pub from: Action,
    pub to: Action,
    pub probability: f64,
}

impl DecisionTransition {
    pub fn key(&self) -> String {
        format!("{}_TO_{}", self.from.name(), self.to.name())
    }
}

/// Sweeps amount and fraud-probability space over a [`RewardFunction`].
pub struct RewardAnalyzer<'a> {
    reward_fn: &'a RewardFunction,
}

impl<'a> RewardAnalyzer<'a> {
    pub fn new(reward_fn: &'a RewardFunction) -> Self {
        Self { reward_fn }
    }

    pub fn amount_weighting_curve(&self, amounts: &[f64]) -> Result<Vec<f64>> {
        amounts.iter().map(|&a| RewardFunction::amount_weight(a)).collect()
    }

    pub fn decision_boundaries(&self, fraud_probabilities: &[f64], amount: f64) -> Result<DecisionBoundaries> {
        let mut optimal_actions = Vec::with_capacity(fraud_probabilities.len());
        let mut expected_rewards: BTreeMap<String, Vec<f64>> = Action::ALL
            .iter()
            .map(|a| (a.name().to_string(), Vec::with_capacity(fraud_probabilities.len())))
            .collect();

        for &p in fraud_probabilities {
            let expected = self.reward_fn.expected_rewards(p, amount)?;
            for action in Action::ALL {
                if let Some(series) = expected_rewards.get_mut(action.name()) {
                    series.push(expected[action.index()]);
                }
            }
            optimal_actions.push(crate::policy::argmax_action(&expected));
        }

        Ok(DecisionBoundaries {
            amount,
            fraud_probabilities: fraud_probabilities.to_vec(),
            optimal_actions,
            expected_rewards,
        })
    }

    /// Every action change along an evenly spaced grid of `resolution` points
    /// over [0, 1], in increasing probability order. Each reported probability
    /// is the first grid point at which the new action is optimal, so it is
    /// accurate to within `1 / (resolution - 1)`.
    pub fn decision_transitions(&self, amount: f64, resolution: usize) -> Result<Vec<DecisionTransition>> {
        if resolution < 2 {
            return Err(FdsError::Config(format!(
                "threshold resolution must be >= 2, got {}",
                resolution
            )));
        }
        let grid = linspace(0.0, 1.0, resolution);
        let mut transitions = Vec::new();
        let mut previous = self.reward_fn.optimal_action(grid[0], amount)?;
        for &p in &grid[1..] {
            let current = self.reward_fn.optimal_action(p, amount)?;
            if current != previous {
                transitions.push(DecisionTransition {
                    from: previous,
                    to: current,
                    probability: p,
                });
            }
            previous = current;
        }
        Ok(transitions)
    }

    /// Transitions keyed `<FROM>_TO_<TO>`, e.g. `APPROVE_TO_MANUAL_REVIEW`.
    ///
    /// An empty map means one action dominates at this amount.
    pub fn decision_thresholds(&self, amount: f64, resolution: usize) -> Result<BTreeMap<String, f64>> {
        let mut thresholds = BTreeMap::new();
        for transition in self.decision_transitions(amount, resolution)? {
            let mut key = transition.key();
            // Linear expected rewards cannot repeat a transition; never overwrite one.
            let mut n = 2;
            while thresholds.contains_key(&key) {
                key = format!("{}_{}", transition.key(), n);
                n += 1;
            }
            thresholds.insert(key, transition.probability);
        }
        Ok(thresholds)
    }
}

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// `n` points evenly spaced in log10 space, `10^lo ..= 10^hi`.
pub fn logspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    linspace(lo, hi, n).into_iter().map(|e| 10f64.powf(e)).collect()
}
