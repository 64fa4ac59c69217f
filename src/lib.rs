//! FDS Core - decision-and-training engine for transaction screening
//!
//! Each transaction gets one of three actions (approve, manual review, block).
//! A value estimator is trained by reinforcement learning against a
//! hand-engineered reward matrix. This crate provides:
//! - Reward shaping and decision theory (optimal actions, decision thresholds)
//! - A bounded FIFO experience-replay buffer
//! - A phased epsilon-greedy exploration curriculum
//! - A training orchestrator with verified checkpoint/resume
//! - Classification and business-cost evaluation
//! - Parallel hyperparameter search

pub mod action;
pub mod analyzer;
pub mod checkpoint;
pub mod config;
pub mod curriculum;
pub mod dataset;
pub mod error;
pub mod estimator;
pub mod evaluator;
pub mod policy;
pub mod replay;
pub mod reward;
pub mod trainer;
pub mod traits;
pub mod tuning;

pub use action::{Action, Outcome};
pub use analyzer::{DecisionBoundaries, DecisionTransition, RewardAnalyzer};
pub use config::{BufferPersistence, BusinessMetricsConfig, FdsConfig, PhaseConfig, RewardMatrix, TrainerConfig};
pub use curriculum::{Curriculum, TrainingPhase};
pub use dataset::{AmountColumn, Dataset, DatasetSchema, TransactionRow};
pub use error::{FdsError, Result};
pub use estimator::{LinearQConfig, LinearQEstimator};
pub use evaluator::{ConfusionCounts, EvaluationReport, Evaluator};
pub use replay::{Experience, ReplayBuffer};
pub use reward::RewardFunction;
pub use trainer::{EpochMetrics, Trainer, TrainerState, TrainingSummary};
pub use traits::ValueEstimator;
pub use tuning::HyperparameterSearch;
