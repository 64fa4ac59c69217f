use serde::{Deserialize, Serialize};

use crate::config::{default_phases, PhaseConfig};
use crate::error::{FdsError, Result};

/// A block of epochs with linearly interpolated exploration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingPhase {
    pub name: String,
    pub epochs: u64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
}

impl TrainingPhase {
    pub fn new(name: impl Into<String>, epochs: u64, epsilon_start: f64, epsilon_end: f64) -> Self {
        Self {
            name: name.into(),
            epochs,
            epsilon_start,
            epsilon_end,
        }
    }

    /// Linear from `epsilon_start` at 0 to `epsilon_end` at `epochs - 1`.
    /// Single-epoch (and empty) phases are fully exploiting.
    pub fn epsilon_at(&self, local_epoch: u64) -> f64 {
        if self.epochs <= 1 || local_epoch >= self.epochs - 1 {
            return self.epsilon_end;
        }
        let t = local_epoch as f64 / (self.epochs - 1) as f64;
        self.epsilon_start + (self.epsilon_end - self.epsilon_start) * t
    }

    pub fn validate(&self) -> Result<()> {
        for eps in [self.epsilon_start, self.epsilon_end] {
            if !(0.0..=1.0).contains(&eps) {
                return Err(FdsError::Config(format!(
                    "phase '{}' epsilon {} outside [0, 1]",
                    self.name, eps
                )));
            }
        }
        Ok(())
    }
}

impl From<&PhaseConfig> for TrainingPhase {
    fn from(config: &PhaseConfig) -> Self {
        Self::new(config.name.clone(), config.epochs, config.epsilon_start, config.epsilon_end)
    }
}

/// Position of a global epoch inside a curriculum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhasePosition {
    pub phase_index: usize,
    pub local_epoch: u64,
}

/// Ordered phases, run front to back with no skipping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curriculum {
    phases: Vec<TrainingPhase>,
}

impl Default for Curriculum {
    fn default() -> Self {
        Self::from_config(&default_phases())
    }
}

impl Curriculum {
    pub fn new(phases: Vec<TrainingPhase>) -> Self {
        Self { phases }
    }

    pub fn from_config(phases: &[PhaseConfig]) -> Self {
        Self::new(phases.iter().map(TrainingPhase::from).collect())
    }

    /// Every phase epsilon must lie in [0, 1].
    pub fn validate(&self) -> Result<()> {
        self.phases.iter().try_for_each(TrainingPhase::validate)
    }

    pub fn phases(&self) -> &[TrainingPhase] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn total_epochs(&self) -> u64 {
        self.phases.iter().map(|p| p.epochs).sum()
    }

    /// Epochs in all phases before `phase_index`.
    pub fn epochs_before(&self, phase_index: usize) -> u64 {
        self.phases.iter().take(phase_index).map(|p| p.epochs).sum()
    }

    /// `None` once `global_epoch` is past the last phase.
    pub fn locate(&self, global_epoch: u64) -> Option<PhasePosition> {
        let mut remaining = global_epoch;
        for (phase_index, phase) in self.phases.iter().enumerate() {
            if remaining < phase.epochs {
                return Some(PhasePosition {
                    phase_index,
                    local_epoch: remaining,
                });
            }
            remaining -= phase.epochs;
        }
        None
    }

    pub fn epsilon_at_global(&self, global_epoch: u64) -> Option<f64> {
        self.locate(global_epoch)
            .map(|pos| self.phases[pos.phase_index].epsilon_at(pos.local_epoch))
    }
}
