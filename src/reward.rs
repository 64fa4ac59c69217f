//! Decision-theoretic reward shaping.
//!
//! Rewards come from a base [`RewardMatrix`]. Fraud outcomes are scaled by an
//! amount weight `1 + log10(amount + 1) / 5`; normal outcomes are never
//! weighted, so high-value transactions are not treated as risky per se.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Outcome};
use crate::config::RewardMatrix;
use crate::error::{FdsError, Result};

#[derive(Clone, Debug, Default)]
pub struct RewardFunction {
    matrix: RewardMatrix,
}

/// Per-cell rewards plus summary statistics over the six cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixAnalysis {
    /// Keyed by action name, then `fraud=0` / `fraud=1`.
    pub cells: BTreeMap<String, BTreeMap<String, f64>>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl RewardFunction {
    pub fn new(matrix: RewardMatrix) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &RewardMatrix {
        &self.matrix
    }

    /// Table lookup on raw ordinals.
    pub fn base_reward(&self, action: i64, outcome: i64) -> Result<f64> {
        let action = Action::from_index(action)?;
        let outcome = Outcome::from_label(outcome)?;
        Ok(self.matrix.get(action, outcome))
    }

    pub fn amount_weight(amount: f64) -> Result<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(FdsError::InvalidAmount(amount));
        }
        Ok(1.0 + (amount + 1.0).log10() / 5.0)
    }

    pub fn reward(&self, action: Action, outcome: Outcome, amount: f64) -> Result<f64> {
        let weight = Self::amount_weight(amount)?;
        let base = self.matrix.get(action, outcome);
        Ok(match outcome {
            Outcome::Fraud => base * weight,
            Outcome::Normal => base,
        })
    }

    pub fn expected_reward(&self, action: Action, fraud_probability: f64, amount: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&fraud_probability) {
            return Err(FdsError::InvalidProbability(fraud_probability));
        }
        let fraud = self.reward(action, Outcome::Fraud, amount)?;
        let normal = self.reward(action, Outcome::Normal, amount)?;
        Ok(fraud_probability * fraud + (1.0 - fraud_probability) * normal)
    }

    /// Expected reward of every action, indexed by ordinal.
    pub fn expected_rewards(&self, fraud_probability: f64, amount: f64) -> Result<[f64; 3]> {
        let mut out = [0.0; 3];
        for action in Action::ALL {
            out[action.index()] = self.expected_reward(action, fraud_probability, amount)?;
        }
        Ok(out)
    }

    /// Argmax of expected reward. Ties go to the lowest ordinal
    /// (APPROVE, then MANUAL_REVIEW, then BLOCK).
    pub fn optimal_action(&self, fraud_probability: f64, amount: f64) -> Result<Action> {
        let expected = self.expected_rewards(fraud_probability, amount)?;
        Ok(crate::policy::argmax_action(&expected))
    }

    pub fn analyze_matrix(&self) -> MatrixAnalysis {
        let mut cells: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut values = Vec::with_capacity(6);
        for (action, outcome, reward) in self.matrix.cells() {
            cells
                .entry(action.name().to_string())
                .or_default()
                .insert(format!("fraud={}", outcome.index()), reward);
            values.push(reward);
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        MatrixAnalysis {
            cells,
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std: variance.sqrt(),
        }
    }

    /// Human-readable table of base rewards and the fraud weighting at `amount`.
    pub fn summary(&self, amount: f64) -> Result<String> {
        let weight = Self::amount_weight(amount)?;
        let rule = "=".repeat(50);
        let mut out = String::new();
        let _ = writeln!(out, "{}\nReward function summary\n{}", rule, rule);
        let _ = writeln!(out, "\nBase rewards (no amount weighting):");
        for action in Action::ALL {
            let _ = writeln!(out, "{}:", action.name());
            for outcome in Outcome::ALL {
                let _ = writeln!(
                    out,
                    "  {:<8}: {:+8.1}",
                    outcome.as_str(),
                    self.matrix.get(action, outcome)
                );
            }
        }
        let _ = writeln!(out, "\n{}\nAmount weighting at {:.0}: x{:.3}", rule, amount, weight);
        for action in Action::ALL {
            let base = self.matrix.get(action, Outcome::Fraud);
            let _ = writeln!(
                out,
                "{} + fraud: base {:+8.1} -> weighted {:+8.1}",
                action.name(),
                base,
                base * weight
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward_fn() -> RewardFunction {
        RewardFunction::new(RewardMatrix::default())
    }

    #[test]
    fn amount_weight_is_one_at_zero() {
        assert_eq!(RewardFunction::amount_weight(0.0).unwrap(), 1.0);
    }

    #[test]
    fn amount_weight_rejects_negative_and_nan() {
        assert!(matches!(
            RewardFunction::amount_weight(-1.0),
            Err(FdsError::InvalidAmount(_))
        ));
        assert!(RewardFunction::amount_weight(f64::NAN).is_err());
    }

    #[test]
    fn base_reward_validates_ordinals() {
        let rf = reward_fn();
        assert_eq!(rf.base_reward(2, 1).unwrap(), 200.0);
        assert!(matches!(rf.base_reward(5, 0), Err(FdsError::InvalidAction(5))));
        assert!(matches!(rf.base_reward(0, 2), Err(FdsError::InvalidOutcome(2))));
    }

    #[test]
    fn fraud_rewards_are_weighted_normal_are_not() {
        let rf = reward_fn();
        let amount = 1_000_000.0;
        let weight = RewardFunction::amount_weight(amount).unwrap();
        assert_eq!(rf.reward(Action::Block, Outcome::Normal, amount).unwrap(), -30.0);
        let weighted = rf.reward(Action::Block, Outcome::Fraud, amount).unwrap();
        assert!((weighted - 200.0 * weight).abs() < 1e-9);
    }

    #[test]
    fn expected_reward_rejects_probability_out_of_range() {
        let rf = reward_fn();
        assert!(rf.expected_reward(Action::Approve, 1.5, 10.0).is_err());
        assert!(rf.expected_reward(Action::Approve, f64::NAN, 10.0).is_err());
    }

    #[test]
    fn optimal_action_extremes() {
        let rf = reward_fn();
        assert_eq!(rf.optimal_action(0.0, 50_000.0).unwrap(), Action::Approve);
        assert_eq!(rf.optimal_action(1.0, 50_000.0).unwrap(), Action::Block);
    }

    #[test]
    fn tie_breaks_to_lowest_ordinal() {
        let flat = RewardFunction::new(RewardMatrix {
            approve_normal: 0.0,
            approve_fraud: 0.0,
            review_normal: 0.0,
            review_fraud: 0.0,
            block_normal: 0.0,
            block_fraud: 0.0,
        });
        assert_eq!(flat.optimal_action(0.5, 100.0).unwrap(), Action::Approve);
    }

    #[test]
    fn matrix_analysis_statistics() {
        let analysis = reward_fn().analyze_matrix();
        assert_eq!(analysis.min, -1000.0);
        assert_eq!(analysis.max, 200.0);
        let expected_mean = (10.0 - 1000.0 - 5.0 + 50.0 - 30.0 + 200.0) / 6.0;
        assert!((analysis.mean - expected_mean).abs() < 1e-9);
        assert!(analysis.std > 0.0);
        assert_eq!(analysis.cells["BLOCK"]["fraud=0"], -30.0);
        assert_eq!(analysis.cells.len(), 3);
    }

    #[test]
    fn summary_mentions_every_action() {
        let text = reward_fn().summary(1_000_000.0).unwrap();
        for action in Action::ALL {
            assert!(text.contains(action.name()));
        }
    }
}
