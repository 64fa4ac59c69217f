use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::action::{Action, Outcome};
use crate::curriculum::Curriculum;
use crate::error::{FdsError, Result};

/// Base reward for every (action, outcome) cell.
///
/// Injected at construction so tuning iterations are configuration changes.
/// Earlier tunings used BLOCK/NORMAL = -100, BLOCK/FRAUD = +100 and
/// APPROVE/FRAUD = -500; the defaults below reduce the approve bias.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardMatrix {
    pub approve_normal: f64,
    pub approve_fraud: f64,
    pub review_normal: f64,
    pub review_fraud: f64,
    pub block_normal: f64,
    pub block_fraud: f64,
}

impl Default for RewardMatrix {
    fn default() -> Self {
        Self {
            approve_normal: 10.0,
            approve_fraud: -1000.0,
            review_normal: -5.0,
            review_fraud: 50.0,
            block_normal: -30.0,
            block_fraud: 200.0,
        }
    }
}

impl RewardMatrix {
    pub fn get(&self, action: Action, outcome: Outcome) -> f64 {
        match (action, outcome) {
            (Action::Approve, Outcome::Normal) => self.approve_normal,
            (Action::Approve, Outcome::Fraud) => self.approve_fraud,
            (Action::ManualReview, Outcome::Normal) => self.review_normal,
            (Action::ManualReview, Outcome::Fraud) => self.review_fraud,
            (Action::Block, Outcome::Normal) => self.block_normal,
            (Action::Block, Outcome::Fraud) => self.block_fraud,
        }
    }

    /// Cells in (action, outcome) row-major order.
    pub fn cells(&self) -> [(Action, Outcome, f64); 6] {
        let mut out = [(Action::Approve, Outcome::Normal, 0.0); 6];
        let mut i = 0;
        for action in Action::ALL {
            for outcome in Outcome::ALL {
                out[i] = (action, outcome, self.get(action, outcome));
                i += 1;
            }
        }
        out
    }

    /// Checks the ordering the decision theory relies on.
    ///
    /// # Invariants
    /// * APPROVE+FRAUD is strictly the most negative cell
    /// * BLOCK+FRAUD is strictly the most positive cell
    /// * every NORMAL cell is <= the APPROVE+NORMAL baseline
    pub fn validate(&self) -> Result<()> {
        let cells = self.cells();
        if cells.iter().any(|(_, _, r)| !r.is_finite()) {
            return Err(FdsError::Config("reward matrix contains a non-finite entry".into()));
        }
        for (action, outcome, reward) in cells {
            let is_anchor = |a, o| action == a && outcome == o;
            if !is_anchor(Action::Approve, Outcome::Fraud) && reward <= self.approve_fraud {
                return Err(FdsError::Config(format!(
                    "APPROVE+FRAUD ({}) must be the most negative reward, but {}+{} = {}",
                    self.approve_fraud,
                    action.name(),
                    outcome.as_str(),
                    reward
                )));
            }
            if !is_anchor(Action::Block, Outcome::Fraud) && reward >= self.block_fraud {
                return Err(FdsError::Config(format!(
                    "BLOCK+FRAUD ({}) must be the most positive reward, but {}+{} = {}",
                    self.block_fraud,
                    action.name(),
                    outcome.as_str(),
                    reward
                )));
            }
        }
        if self.review_normal > self.approve_normal || self.block_normal > self.approve_normal {
            return Err(FdsError::Config(
                "NORMAL-outcome rewards must not exceed the APPROVE+NORMAL baseline".into(),
            ));
        }
        Ok(())
    }
}

/// Externally supplied cost constants for business metrics. Never learned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetricsConfig {
    pub avg_fraud_amount: f64,
    pub avg_normal_amount: f64,
    pub manual_review_cost: f64,
    pub false_block_cost: f64,
}

impl Default for BusinessMetricsConfig {
    fn default() -> Self {
        Self {
            avg_fraud_amount: 500_000.0,
            avg_normal_amount: 50_000.0,
            manual_review_cost: 5_000.0,
            false_block_cost: 10_000.0,
        }
    }
}

impl BusinessMetricsConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("avg_fraud_amount", self.avg_fraud_amount),
            ("avg_normal_amount", self.avg_normal_amount),
            ("manual_review_cost", self.manual_review_cost),
            ("false_block_cost", self.false_block_cost),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(FdsError::Config(format!("{} must be finite and >= 0", name)));
            }
        }
        Ok(())
    }
}

/// How much of the replay buffer a checkpoint stores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BufferPersistence {
    /// Every stored experience. Resume is exact.
    #[default]
    Full,
    /// Only the `max` most recent experiences. Resume then trains on a
    /// different distribution than an uninterrupted run would.
    Sampled { max: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_discount")]
    pub discount: f64,
    #[serde(default = "default_target_update_freq")]
    pub target_update_freq: u64,
    /// 1.0 is a hard copy; smaller values blend (soft update).
    #[serde(default = "default_target_blend")]
    pub target_blend: f64,
    #[serde(default = "default_steps_per_epoch")]
    pub steps_per_epoch: usize,
    /// Ceiling on rows drawn per epoch, independent of dataset size.
    #[serde(default = "default_max_epoch_sample")]
    pub max_epoch_sample: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    #[serde(default)]
    pub checkpoint_every_epochs: Option<u64>,
    #[serde(default)]
    pub buffer_persistence: BufferPersistence,
}

fn default_buffer_capacity() -> usize {
    100_000
}

fn default_batch_size() -> usize {
    64
}

fn default_discount() -> f64 {
    0.99
}

fn default_target_update_freq() -> u64 {
    100
}

fn default_target_blend() -> f64 {
    1.0
}

fn default_steps_per_epoch() -> usize {
    1000
}

fn default_max_epoch_sample() -> usize {
    10_000
}

fn default_seed() -> u64 {
    42
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            batch_size: default_batch_size(),
            discount: default_discount(),
            target_update_freq: default_target_update_freq(),
            target_blend: default_target_blend(),
            steps_per_epoch: default_steps_per_epoch(),
            max_epoch_sample: default_max_epoch_sample(),
            seed: default_seed(),
            checkpoint_dir: None,
            checkpoint_every_epochs: None,
            buffer_persistence: BufferPersistence::Full,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FdsError::Config("batch_size must be >= 1".into()));
        }
        if self.buffer_capacity < self.batch_size {
            return Err(FdsError::Config(format!(
                "buffer_capacity ({}) must be >= batch_size ({})",
                self.buffer_capacity, self.batch_size
            )));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(FdsError::Config("discount must be in [0, 1]".into()));
        }
        if !(self.target_blend > 0.0 && self.target_blend <= 1.0) {
            return Err(FdsError::Config("target_blend must be in (0, 1]".into()));
        }
        if self.target_update_freq == 0 {
            return Err(FdsError::Config("target_update_freq must be >= 1".into()));
        }
        if self.max_epoch_sample == 0 {
            return Err(FdsError::Config("max_epoch_sample must be >= 1".into()));
        }
        if self.checkpoint_every_epochs == Some(0) {
            return Err(FdsError::Config("checkpoint_every_epochs must be >= 1 when set".into()));
        }
        if let BufferPersistence::Sampled { max: 0 } = self.buffer_persistence {
            return Err(FdsError::Config("sampled buffer persistence needs max >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    pub epochs: u64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
}

impl PhaseConfig {
    pub fn new(name: impl Into<String>, epochs: u64, epsilon_start: f64, epsilon_end: f64) -> Self {
        Self {
            name: name.into(),
            epochs,
            epsilon_start,
            epsilon_end,
        }
    }

    /// Epoch count multiplied by `scale`, rounded. Non-empty phases keep at
    /// least one epoch; empty phases stay empty.
    pub fn scaled(&self, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FdsError::Config(format!("epoch scale {} must be positive", scale)));
        }
        let epochs = if self.epochs == 0 {
            0
        } else {
            ((self.epochs as f64 * scale).round() as u64).max(1)
        };
        Ok(Self {
            epochs,
            ..self.clone()
        })
    }
}

/// The three-phase exploration schedule used when none is configured.
pub(crate) fn default_phases() -> Vec<PhaseConfig> {
    vec![
        PhaseConfig::new("Phase 1", 30, 1.0, 0.3),
        PhaseConfig::new("Phase 2", 40, 0.3, 0.1),
        PhaseConfig::new("Phase 3", 30, 0.1, 0.01),
    ]
}

/// Top-level configuration, loadable from TOML or JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FdsConfig {
    #[serde(default)]
    pub rewards: RewardMatrix,
    #[serde(default)]
    pub business: BusinessMetricsConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,
}

impl Default for FdsConfig {
    fn default() -> Self {
        Self {
            rewards: RewardMatrix::default(),
            business: BusinessMetricsConfig::default(),
            trainer: TrainerConfig::default(),
            phases: default_phases(),
        }
    }
}

impl FdsConfig {
    /// Loads configuration; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FdsConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rewards.validate()?;
        self.business.validate()?;
        self.trainer.validate()?;
        Curriculum::from_config(&self.phases).validate()
    }
}
