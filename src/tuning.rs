//! Grid and random hyperparameter search.
//!
//! Each trial trains its own isolated [`Trainer`] on a single short phase and
//! is scored greedily on a validation set. Trials share nothing mutable, so
//! they run in parallel on the rayon pool.

use std::cmp::Ordering;
use std::marker::PhantomData;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::action::Action;
use crate::config::TrainerConfig;
use crate::curriculum::{Curriculum, TrainingPhase};
use crate::dataset::Dataset;
use crate::error::{FdsError, Result};
use crate::policy::argmax_action;
use crate::reward::RewardFunction;
use crate::trainer::Trainer;
use crate::traits::ValueEstimator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialParams {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub discount: f64,
    pub buffer_capacity: usize,
}

/// Every combination of the listed values is tried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub learning_rates: Vec<f64>,
    pub batch_sizes: Vec<usize>,
    pub discounts: Vec<f64>,
    pub buffer_capacities: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![1e-4, 1e-3, 1e-2],
            batch_sizes: vec![32, 64],
            discounts: vec![0.99],
            buffer_capacities: vec![100_000],
        }
    }
}

impl ParamGrid {
    pub fn combinations(&self) -> Vec<TrialParams> {
        let mut out = Vec::new();
        for &learning_rate in &self.learning_rates {
            for &batch_size in &self.batch_sizes {
                for &discount in &self.discounts {
                    for &buffer_capacity in &self.buffer_capacities {
                        out.push(TrialParams {
                            learning_rate,
                            batch_size,
                            discount,
                            buffer_capacity,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Continuous ranges are sampled uniformly; lists are sampled as choices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpace {
    pub learning_rate: (f64, f64),
    pub batch_sizes: Vec<usize>,
    pub discount: (f64, f64),
    pub buffer_capacities: Vec<usize>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            learning_rate: (1e-4, 1e-2),
            batch_sizes: vec![32, 64, 128],
            discount: (0.9, 0.99),
            buffer_capacities: vec![50_000, 100_000],
        }
    }
}

impl ParamSpace {
    fn uniform<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
        if hi > lo {
            rng.gen_range(lo..=hi)
        } else {
            lo
        }
    }

    fn choose<R: Rng>(rng: &mut R, values: &[usize], name: &str) -> Result<usize> {
        if values.is_empty() {
            return Err(FdsError::Config(format!("search space '{}' has no values", name)));
        }
        Ok(values[rng.gen_range(0..values.len())])
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<TrialParams> {
        Ok(TrialParams {
            learning_rate: Self::uniform(rng, self.learning_rate),
            batch_size: Self::choose(rng, &self.batch_sizes, "batch_sizes")?,
            discount: Self::uniform(rng, self.discount),
            buffer_capacity: Self::choose(rng, &self.buffer_capacities, "buffer_capacities")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialScores {
    pub val_avg_reward: f64,
    pub val_accuracy: f64,
    pub train_final_loss: f64,
    pub train_avg_reward: f64,
}

impl TrialScores {
    /// Worst-case scores recorded for a trial that failed.
    pub fn failed() -> Self {
        Self {
            val_avg_reward: -1000.0,
            val_accuracy: 0.0,
            train_final_loss: 1000.0,
            train_avg_reward: -1000.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub params: TrialParams,
    pub scores: TrialScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub epochs_per_trial: u64,
    pub steps_per_epoch: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            epochs_per_trial: 10,
            steps_per_epoch: 100,
        }
    }
}

pub struct HyperparameterSearch<'a, E, F> {
    train: &'a Dataset,
    validation: &'a Dataset,
    reward_fn: RewardFunction,
    base: TrainerConfig,
    settings: SearchSettings,
    factory: F,
    results: Vec<TrialResult>,
    _estimator: PhantomData<fn() -> E>,
}

impl<'a, E, F> HyperparameterSearch<'a, E, F>
where
    E: ValueEstimator,
    F: Fn(&TrialParams, usize) -> E + Sync,
{
    /// `factory` builds a fresh estimator for a trial given its parameters and
    /// the feature width.
    pub fn new(
        train: &'a Dataset,
        validation: &'a Dataset,
        reward_fn: RewardFunction,
        base: TrainerConfig,
        settings: SearchSettings,
        factory: F,
    ) -> Self {
        Self {
            train,
            validation,
            reward_fn,
            base,
            settings,
            factory,
            results: Vec::new(),
            _estimator: PhantomData,
        }
    }

    pub fn grid(&mut self, grid: &ParamGrid) -> Result<Vec<TrialResult>> {
        let candidates = grid.combinations();
        info!(trials = candidates.len(), "grid search started");
        Ok(self.run(candidates))
    }

    pub fn random(&mut self, space: &ParamSpace, trials: usize, seed: u64) -> Result<Vec<TrialResult>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let candidates = (0..trials)
            .map(|_| space.sample(&mut rng))
            .collect::<Result<Vec<_>>>()?;
        info!(trials, seed, "random search started");
        Ok(self.run(candidates))
    }

    /// All results gathered so far, best first.
    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn best(&self) -> Result<&TrialResult> {
        self.results
            .first()
            .ok_or_else(|| FdsError::Config("no tuning results available".into()))
    }

    fn run(&mut self, candidates: Vec<TrialParams>) -> Vec<TrialResult> {
        let this = &*self;
        let mut results: Vec<TrialResult> = candidates
            .par_iter()
            .map(|params| this.run_trial(params))
            .collect();
        sort_best_first(&mut results);
        if let Some(best) = results.first() {
            info!(
                val_avg_reward = best.scores.val_avg_reward,
                learning_rate = best.params.learning_rate,
                batch_size = best.params.batch_size,
                "search finished"
            );
        }
        self.results.extend(results.iter().cloned());
        sort_best_first(&mut self.results);
        results
    }

    fn run_trial(&self, params: &TrialParams) -> TrialResult {
        match self.try_trial(params) {
            Ok(scores) => TrialResult {
                params: params.clone(),
                scores,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, ?params, "trial failed");
                TrialResult {
                    params: params.clone(),
                    scores: TrialScores::failed(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn try_trial(&self, params: &TrialParams) -> Result<TrialScores> {
        let config = TrainerConfig {
            batch_size: params.batch_size,
            discount: params.discount,
            buffer_capacity: params.buffer_capacity,
            steps_per_epoch: self.settings.steps_per_epoch,
            checkpoint_dir: None,
            checkpoint_every_epochs: None,
            ..self.base.clone()
        };
        let estimator = (self.factory)(params, self.train.feature_dim());
        let curriculum = Curriculum::new(vec![TrainingPhase::new(
            "Quick Tune",
            self.settings.epochs_per_trial,
            1.0,
            0.1,
        )]);
        let mut trainer = Trainer::new(estimator, self.reward_fn.clone(), curriculum, config)?;
        trainer.train(self.train)?;
        let summary = trainer.metrics_summary();
        let (val_avg_reward, val_accuracy) = self.validate(trainer.estimator())?;
        Ok(TrialScores {
            val_avg_reward,
            val_accuracy,
            train_final_loss: summary.final_loss,
            train_avg_reward: summary.mean_reward,
        })
    }

    /// Mean reward and flagged-vs-fraud accuracy under the greedy policy.
    fn validate(&self, estimator: &E) -> Result<(f64, f64)> {
        let data = self.validation;
        data.validate()?;
        let mut reward_sum = 0.0;
        let mut correct = 0usize;
        for (i, row) in data.rows.iter().enumerate() {
            let action: Action = argmax_action(&estimator.predict(&row.features)?);
            let outcome = data.outcome(i)?;
            reward_sum += self.reward_fn.reward(action, outcome, data.amount(i)?)?;
            if action.is_flagged() == outcome.is_fraud() {
                correct += 1;
            }
        }
        let n = data.len() as f64;
        Ok((reward_sum / n, correct as f64 / n))
    }
}

fn sort_best_first(results: &mut [TrialResult]) {
    results.sort_by(|a, b| {
        a.error
            .is_some()
            .cmp(&b.error.is_some())
            .then_with(|| {
                b.scores
                    .val_avg_reward
                    .partial_cmp(&a.scores.val_avg_reward)
                    .unwrap_or(Ordering::Equal)
            })
    });
}
