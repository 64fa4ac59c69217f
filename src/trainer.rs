//! Curriculum-driven DQN-style training loop.
//!
//! Every transaction is a one-step episode: `next_state == state` and the
//! transition is terminal, so the bootstrap term vanishes and `discount` has
//! no effect on targets. It is kept as a configuration knob for estimators
//! fed multi-step data.

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::checkpoint::{self, write_atomic, TrainerSnapshot};
use crate::config::TrainerConfig;
use crate::curriculum::{Curriculum, TrainingPhase};
use crate::dataset::Dataset;
use crate::error::{FdsError, Result};
use crate::policy::EpsilonGreedy;
use crate::replay::{Experience, ReplayBuffer, SampledBatch};
use crate::reward::RewardFunction;
use crate::traits::ValueEstimator;

/// Per-epoch record kept in [`TrainerState::history`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub phase: String,
    pub phase_index: usize,
    pub local_epoch: u64,
    pub global_epoch: u64,
    /// Mean over all configured steps; skipped steps count as zero.
    pub loss: f64,
    pub mean_reward: f64,
    pub epsilon: f64,
    pub buffer_size: usize,
    pub approve_rate: f64,
    pub review_rate: f64,
    pub block_rate: f64,
    pub skipped_steps: usize,
}

/// Raw outcome of one [`Trainer::train_epoch`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub mean_reward: f64,
    pub action_counts: [usize; 3],
    pub rows: usize,
    pub skipped_steps: usize,
}

impl EpochStats {
    fn rate(&self, action: Action) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.action_counts[action.index()] as f64 / self.rows as f64
        }
    }
}

/// Resumable position of a run. `current_epoch` is global and counts
/// completed epochs across all phases.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub current_phase: usize,
    pub current_epoch: u64,
    pub total_gradient_steps: u64,
    pub history: Vec<EpochMetrics>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs_run: u64,
    pub total_epochs: u64,
    pub total_gradient_steps: u64,
    pub final_epsilon: f64,
    pub final_loss: f64,
    pub final_mean_reward: f64,
    pub checkpoints: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_epochs: usize,
    pub total_steps: u64,
    pub mean_loss: f64,
    pub final_loss: f64,
    pub mean_reward: f64,
    pub final_reward: f64,
    pub final_epsilon: f64,
    pub final_buffer_size: usize,
}

pub struct Trainer<E: ValueEstimator> {
    main: E,
    target: E,
    buffer: ReplayBuffer,
    curriculum: Curriculum,
    reward_fn: RewardFunction,
    config: TrainerConfig,
    rng: ChaCha8Rng,
    state: TrainerState,
}

impl<E: ValueEstimator> Trainer<E> {
    /// The target estimator starts as an exact copy of `estimator`.
    pub fn new(estimator: E, reward_fn: RewardFunction, curriculum: Curriculum, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        curriculum.validate()?;
        let target = estimator.clone();
        Ok(Self {
            main: estimator,
            target,
            buffer: ReplayBuffer::new(config.buffer_capacity),
            curriculum,
            reward_fn,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            state: TrainerState::default(),
        })
    }

    /// Rebuilds a trainer entirely from a checkpoint directory.
    pub fn from_checkpoint(dir: &Path) -> Result<Self> {
        let loaded = checkpoint::load_checkpoint::<E>(dir)?;
        let snapshot = loaded.snapshot;
        snapshot.config.validate()?;
        snapshot.curriculum.validate()?;
        info!(
            dir = %dir.display(),
            epoch = snapshot.state.current_epoch,
            phase = snapshot.state.current_phase,
            "trainer restored from checkpoint"
        );
        Ok(Self {
            main: loaded.main,
            target: loaded.target,
            buffer: ReplayBuffer::from_experiences(snapshot.buffer_capacity, snapshot.buffer),
            curriculum: snapshot.curriculum,
            reward_fn: RewardFunction::new(snapshot.rewards),
            config: snapshot.config,
            rng: snapshot.rng,
            state: snapshot.state,
        })
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn estimator(&self) -> &E {
        &self.main
    }

    pub fn target_estimator(&self) -> &E {
        &self.target
    }

    pub fn into_estimator(self) -> E {
        self.main
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn reward_function(&self) -> &RewardFunction {
        &self.reward_fn
    }

    /// Replaces the curriculum wholesale and rewinds to its first epoch.
    /// Gradient-step count, history and buffer are kept.
    pub fn set_curriculum(&mut self, curriculum: Curriculum) -> Result<()> {
        curriculum.validate()?;
        self.curriculum = curriculum;
        self.state.current_phase = 0;
        self.state.current_epoch = 0;
        Ok(())
    }

    /// Exploration rate the next epoch of [`Trainer::train`] will use.
    pub fn next_epsilon(&self) -> Option<f64> {
        self.curriculum.epsilon_at_global(self.state.current_epoch)
    }

    /// Actions the next epoch would take for `states` at `epsilon`, computed
    /// on a copy of the RNG so the trainer is not advanced.
    pub fn preview_actions(&self, states: &[Vec<f64>], epsilon: f64) -> Result<Vec<Action>> {
        let mut rng = self.rng.clone();
        EpsilonGreedy::new(epsilon)?.select_batch(&self.main, states, &mut rng)
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<()> {
        if dataset.feature_dim() != self.main.feature_dim() {
            return Err(FdsError::DatasetSchema(format!(
                "dataset has {} feature columns, estimator expects {}",
                dataset.feature_dim(),
                self.main.feature_dim()
            )));
        }
        Ok(())
    }

    /// Collect one epoch of experience at a fixed `epsilon`, then run the
    /// configured number of gradient steps.
    ///
    /// Sampled rows are all validated before any experience is stored, so a
    /// bad row fails the epoch without touching the buffer.
    pub fn train_epoch(&mut self, dataset: &Dataset, epsilon: f64) -> Result<EpochStats> {
        let policy = EpsilonGreedy::new(epsilon)?;
        self.check_dataset(dataset)?;
        if dataset.is_empty() {
            return Err(FdsError::DatasetSchema("dataset has no rows".into()));
        }

        let indices = dataset.sample_indices(self.config.max_epoch_sample, &mut self.rng);
        let mut rows = Vec::with_capacity(indices.len());
        for &i in &indices {
            dataset.validate_row(i)?;
            rows.push((i, dataset.outcome(i)?, dataset.amount(i)?));
        }

        let mut action_counts = [0usize; 3];
        let mut reward_sum = 0.0;
        for (i, outcome, amount) in rows {
            let state = &dataset.rows[i].features;
            let action = policy.select(&self.main, state, &mut self.rng)?;
            let reward = self.reward_fn.reward(action, outcome, amount)?;
            action_counts[action.index()] += 1;
            reward_sum += reward;
            self.buffer.push(Experience::terminal(state.clone(), action, reward));
        }

        let mut loss_sum = 0.0;
        let mut skipped_steps = 0;
        for _ in 0..self.config.steps_per_epoch {
            match self.train_step()? {
                Some(loss) => loss_sum += loss,
                None => skipped_steps += 1,
            }
        }

        let n = indices.len();
        Ok(EpochStats {
            loss: if self.config.steps_per_epoch == 0 {
                0.0
            } else {
                loss_sum / self.config.steps_per_epoch as f64
            },
            mean_reward: if n == 0 { 0.0 } else { reward_sum / n as f64 },
            action_counts,
            rows: n,
            skipped_steps,
        })
    }

    /// One minibatch update. `None` when the buffer holds less than a batch.
    pub fn train_step(&mut self) -> Result<Option<f64>> {
        if self.buffer.len() < self.config.batch_size {
            return Ok(None);
        }
        let batch = self.buffer.sample_batch(self.config.batch_size, &mut self.rng)?;
        let targets = self.td_targets(&batch)?;
        let loss = self.main.train_on_batch(&batch.states, &batch.actions, &targets)?;

        self.state.total_gradient_steps += 1;
        if self.state.total_gradient_steps % self.config.target_update_freq == 0 {
            self.main.copy_weights_to(&mut self.target, self.config.target_blend)?;
            debug!(
                step = self.state.total_gradient_steps,
                blend = self.config.target_blend,
                "target estimator synced"
            );
        }
        Ok(Some(loss))
    }

    /// `reward + discount * max_a Q_target(next_state, a)`, or just the
    /// reward for terminal transitions.
    fn td_targets(&self, batch: &SampledBatch) -> Result<Vec<f64>> {
        let next_q = self.target.predict_batch(&batch.next_states)?;
        Ok(batch
            .rewards
            .iter()
            .zip(&next_q)
            .zip(&batch.terminals)
            .map(|((reward, q), terminal)| {
                if *terminal {
                    *reward
                } else {
                    let bootstrap = q.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    reward + self.config.discount * bootstrap
                }
            })
            .collect())
    }

    /// Runs the remaining curriculum from the current position.
    ///
    /// With a checkpoint directory configured, a checkpoint is written after
    /// every phase (`checkpoint_phase{N}`) and, if requested, every
    /// `checkpoint_every_epochs` epochs (`checkpoint_epoch{N}`). Checkpoint
    /// failures abort the run.
    pub fn train(&mut self, dataset: &Dataset) -> Result<TrainingSummary> {
        self.train_for(dataset, u64::MAX)
    }

    /// Like [`Trainer::train`], but stops after at most `max_epochs` epochs.
    /// Stopping mid-phase leaves the position resumable.
    pub fn train_for(&mut self, dataset: &Dataset, max_epochs: u64) -> Result<TrainingSummary> {
        self.check_dataset(dataset)?;
        dataset.validate()?;

        let start_epoch = self.state.current_epoch;
        let total_epochs = self.curriculum.total_epochs();
        let mut checkpoints = Vec::new();
        let mut last_epsilon = self.next_epsilon().unwrap_or(0.0);
        info!(
            rows = dataset.len(),
            fraud_rate = dataset.fraud_rate(),
            start_epoch,
            total_epochs,
            "training started"
        );

        'phases: while self.state.current_phase < self.curriculum.len() {
            let phase_index = self.state.current_phase;
            let phase: TrainingPhase = self.curriculum.phases()[phase_index].clone();
            let phase_start = self.curriculum.epochs_before(phase_index);
            let local_start = self.state.current_epoch.saturating_sub(phase_start);

            if local_start < phase.epochs {
                info!(
                    phase = %phase.name,
                    epochs = phase.epochs - local_start,
                    epsilon_start = phase.epsilon_at(local_start),
                    epsilon_end = phase.epsilon_end,
                    "phase started"
                );
            }

            for local_epoch in local_start..phase.epochs {
                if self.state.current_epoch - start_epoch >= max_epochs {
                    break 'phases;
                }
                let epsilon = phase.epsilon_at(local_epoch);
                let stats = self.train_epoch(dataset, epsilon)?;
                self.state.current_epoch += 1;
                last_epsilon = epsilon;

                let metrics = EpochMetrics {
                    phase: phase.name.clone(),
                    phase_index,
                    local_epoch,
                    global_epoch: self.state.current_epoch,
                    loss: stats.loss,
                    mean_reward: stats.mean_reward,
                    epsilon,
                    buffer_size: self.buffer.len(),
                    approve_rate: stats.rate(Action::Approve),
                    review_rate: stats.rate(Action::ManualReview),
                    block_rate: stats.rate(Action::Block),
                    skipped_steps: stats.skipped_steps,
                };
                info!(
                    epoch = metrics.global_epoch,
                    total = total_epochs,
                    loss = metrics.loss,
                    reward = metrics.mean_reward,
                    epsilon = metrics.epsilon,
                    approve = metrics.approve_rate,
                    review = metrics.review_rate,
                    block = metrics.block_rate,
                    "epoch complete"
                );
                if metrics.skipped_steps > 0 {
                    debug!(skipped = metrics.skipped_steps, "gradient steps skipped on short buffer");
                }
                self.state.history.push(metrics);

                if let (Some(dir), Some(every)) = (&self.config.checkpoint_dir, self.config.checkpoint_every_epochs) {
                    if self.state.current_epoch % every == 0 {
                        let path = dir.join(format!("checkpoint_epoch{}", self.state.current_epoch));
                        self.save_checkpoint(&path)?;
                        checkpoints.push(path);
                    }
                }
            }

            self.state.current_phase += 1;
            info!(phase = %phase.name, "phase complete");
            if let Some(dir) = self.config.checkpoint_dir.clone() {
                let path = dir.join(format!("checkpoint_phase{}", phase_index + 1));
                self.save_checkpoint(&path)?;
                checkpoints.push(path);
            }
        }

        let summary = self.metrics_summary();
        info!(
            epochs = self.state.current_epoch - start_epoch,
            steps = self.state.total_gradient_steps,
            final_loss = summary.final_loss,
            "training stopped"
        );
        Ok(TrainingSummary {
            epochs_run: self.state.current_epoch - start_epoch,
            total_epochs,
            total_gradient_steps: self.state.total_gradient_steps,
            final_epsilon: last_epsilon,
            final_loss: summary.final_loss,
            final_mean_reward: summary.final_reward,
            checkpoints,
        })
    }

    fn snapshot(&self) -> TrainerSnapshot {
        let all: Vec<Experience> = self.buffer.iter().cloned().collect();
        let (buffer, buffer_complete) = TrainerSnapshot::buffer_for_persistence(self.config.buffer_persistence, all);
        if !buffer_complete {
            warn!(
                kept = buffer.len(),
                stored = self.buffer.len(),
                "checkpoint keeps only the most recent experiences; resume will not be exact"
            );
        }
        TrainerSnapshot {
            state: self.state.clone(),
            curriculum: self.curriculum.clone(),
            rng: self.rng.clone(),
            config: self.config.clone(),
            rewards: *self.reward_fn.matrix(),
            buffer_capacity: self.buffer.capacity(),
            buffer,
            buffer_complete,
        }
    }

    pub fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        checkpoint::save_checkpoint(dir, &self.main, &self.target, &self.snapshot())
    }

    /// Replaces estimators, buffer, curriculum, reward matrix, RNG and state
    /// from `dir`. Nothing changes unless the whole checkpoint verifies. The
    /// trainer config is kept.
    pub fn restore_checkpoint(&mut self, dir: &Path) -> Result<()> {
        let loaded = checkpoint::load_checkpoint::<E>(dir)?;
        if loaded.main.feature_dim() != self.main.feature_dim() {
            return Err(FdsError::CheckpointCorruption(format!(
                "{}: estimator width {} does not match trainer width {}",
                dir.display(),
                loaded.main.feature_dim(),
                self.main.feature_dim()
            )));
        }
        let snapshot = loaded.snapshot;
        snapshot.curriculum.validate()?;
        if snapshot.rewards != *self.reward_fn.matrix() {
            warn!(dir = %dir.display(), "checkpoint was written with a different reward matrix; adopting the stored one");
        }
        if snapshot.config != self.config {
            warn!(dir = %dir.display(), "checkpoint was written with a different trainer config; keeping the current one");
        }
        if !snapshot.buffer_complete {
            warn!(dir = %dir.display(), "checkpoint holds a truncated replay buffer");
        }

        self.main = loaded.main;
        self.target = loaded.target;
        self.buffer = ReplayBuffer::from_experiences(snapshot.buffer_capacity, snapshot.buffer);
        self.curriculum = snapshot.curriculum;
        self.reward_fn = RewardFunction::new(snapshot.rewards);
        self.rng = snapshot.rng;
        self.state = snapshot.state;
        info!(dir = %dir.display(), epoch = self.state.current_epoch, "checkpoint restored");
        Ok(())
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        let history = &self.state.history;
        let Some(last) = history.last() else {
            return MetricsSummary {
                total_steps: self.state.total_gradient_steps,
                ..MetricsSummary::default()
            };
        };
        let n = history.len() as f64;
        MetricsSummary {
            total_epochs: history.len(),
            total_steps: self.state.total_gradient_steps,
            mean_loss: history.iter().map(|m| m.loss).sum::<f64>() / n,
            final_loss: last.loss,
            mean_reward: history.iter().map(|m| m.mean_reward).sum::<f64>() / n,
            final_reward: last.mean_reward,
            final_epsilon: last.epsilon,
            final_buffer_size: last.buffer_size,
        }
    }

    pub fn write_history_json(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.state.history)?;
        write_atomic(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AmountColumn, DatasetSchema, TransactionRow};
    use crate::estimator::{LinearQConfig, LinearQEstimator};

    fn dataset(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| TransactionRow {
                features: vec![(i % 7) as f64 / 7.0, if i % 5 == 0 { 1.0 } else { 0.0 }],
                label: u8::from(i % 5 == 0),
                amount: Some(10_000.0 + i as f64),
            })
            .collect();
        Dataset::new(
            DatasetSchema {
                feature_names: vec!["f0".into(), "f1".into()],
                amount: AmountColumn::Raw,
            },
            rows,
        )
    }

    fn trainer(config: TrainerConfig) -> Trainer<LinearQEstimator> {
        Trainer::new(
            LinearQEstimator::new(2, LinearQConfig::default()),
            RewardFunction::default(),
            Curriculum::new(vec![TrainingPhase::new("warmup", 2, 1.0, 0.5)]),
            config,
        )
        .unwrap()
    }

    fn small_config() -> TrainerConfig {
        TrainerConfig {
            buffer_capacity: 64,
            batch_size: 8,
            steps_per_epoch: 4,
            max_epoch_sample: 16,
            target_update_freq: 3,
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn short_buffer_skips_steps() {
        let mut t = trainer(TrainerConfig {
            batch_size: 32,
            max_epoch_sample: 4,
            steps_per_epoch: 3,
            ..small_config()
        });
        let stats = t.train_epoch(&dataset(20), 1.0).unwrap();
        assert_eq!(stats.skipped_steps, 3);
        assert_eq!(stats.loss, 0.0);
        assert_eq!(t.state().total_gradient_steps, 0);
        assert_eq!(t.buffer().len(), 4);
    }

    #[test]
    fn every_experience_is_terminal_single_step() {
        let mut t = trainer(small_config());
        t.train_epoch(&dataset(20), 0.5).unwrap();
        assert!(t.buffer().iter().all(|e| e.terminal && e.state == e.next_state));
    }

    #[test]
    fn target_syncs_on_cadence() {
        let mut t = trainer(TrainerConfig {
            steps_per_epoch: 3,
            ..small_config()
        });
        t.train_epoch(&dataset(40), 1.0).unwrap();
        assert_eq!(t.state().total_gradient_steps, 3);
        let state = [0.4, 1.0];
        assert_eq!(
            t.estimator().predict(&state).unwrap(),
            t.target_estimator().predict(&state).unwrap()
        );
    }

    #[test]
    fn train_runs_whole_curriculum() {
        let mut t = trainer(small_config());
        let summary = t.train(&dataset(30)).unwrap();
        assert_eq!(summary.epochs_run, 2);
        assert_eq!(t.state().current_phase, 1);
        assert_eq!(t.state().history.len(), 2);
        assert_eq!(t.state().history[1].epsilon, 0.5);
        assert!(t.next_epsilon().is_none());

        let again = t.train(&dataset(30)).unwrap();
        assert_eq!(again.epochs_run, 0);
    }

    #[test]
    fn width_mismatch_fails_before_training() {
        let mut t = trainer(small_config());
        let mut ds = dataset(10);
        ds.schema.feature_names.push("extra".into());
        assert!(matches!(t.train(&ds), Err(FdsError::DatasetSchema(_))));
        assert_eq!(t.buffer().len(), 0);
    }

    #[test]
    fn non_terminal_targets_bootstrap_from_target_estimator() {
        let t = trainer(TrainerConfig {
            discount: 0.9,
            ..small_config()
        });
        let next = vec![0.3, 1.0];
        let live = Experience {
            state: vec![0.1, 0.0],
            action: Action::ManualReview,
            reward: 2.0,
            next_state: next.clone(),
            terminal: false,
        };
        let done = Experience {
            terminal: true,
            ..live.clone()
        };
        let batch: SampledBatch = [&live, &done].into_iter().collect();

        let q = t.target_estimator().predict(&next).unwrap();
        let best = q[0].max(q[1]).max(q[2]);
        let targets = t.td_targets(&batch).unwrap();
        assert_eq!(targets[0], 2.0 + 0.9 * best);
        assert_eq!(targets[1], 2.0);
    }

    #[test]
    fn out_of_range_curriculum_epsilon_is_rejected() {
        let bad = || Curriculum::new(vec![TrainingPhase::new("bad", 2, 1.5, -0.5)]);
        let built = Trainer::new(
            LinearQEstimator::new(2, LinearQConfig::default()),
            RewardFunction::default(),
            bad(),
            small_config(),
        );
        assert!(matches!(built, Err(FdsError::Config(_))));

        let mut t = trainer(small_config());
        t.train_for(&dataset(20), 1).unwrap();
        let before = t.state().clone();
        assert!(matches!(t.set_curriculum(bad()), Err(FdsError::Config(_))));
        assert_eq!(t.state(), &before);
        assert_eq!(t.curriculum().phases()[0].name, "warmup");
        assert!(matches!(t.train_epoch(&dataset(20), 1.5), Err(FdsError::Config(_))));
    }

    #[test]
    fn summary_of_empty_history_is_zero() {
        let t = trainer(small_config());
        assert_eq!(t.metrics_summary(), MetricsSummary::default());
    }
}
