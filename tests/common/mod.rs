#![allow(dead_code)]

use fds_core::dataset::DEFAULT_AMOUNT_SCALE;
use fds_core::{
    AmountColumn, Curriculum, Dataset, DatasetSchema, LinearQConfig, LinearQEstimator, RewardFunction, Trainer,
    TrainerConfig, TrainingPhase, TransactionRow,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const FEATURES: [&str; 4] = ["amount_normalized", "hour_of_day", "is_night", "velocity"];

/// Fraud rows skew towards large amounts, night hours and high velocity.
pub fn synthetic_dataset(rows: usize, fraud_rate: f64, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows = (0..rows)
        .map(|_| {
            let fraud = rng.gen_bool(fraud_rate);
            let amount: f64 = if fraud {
                rng.gen_range(200_000.0..5_000_000.0)
            } else {
                rng.gen_range(1_000.0..300_000.0)
            };
            let hour: f64 = if fraud { rng.gen_range(0.0..6.0) } else { rng.gen_range(6.0..24.0) };
            let velocity: f64 = if fraud { rng.gen_range(0.5..1.0) } else { rng.gen_range(0.0..0.6) };
            TransactionRow {
                features: vec![
                    amount.ln_1p() / DEFAULT_AMOUNT_SCALE,
                    hour / 24.0,
                    if hour < 6.0 { 1.0 } else { 0.0 },
                    velocity,
                ],
                label: u8::from(fraud),
                amount: None,
            }
        })
        .collect();
    Dataset::new(
        DatasetSchema {
            feature_names: FEATURES.iter().map(|s| s.to_string()).collect(),
            amount: AmountColumn::default(),
        },
        rows,
    )
}

pub fn quick_config() -> TrainerConfig {
    TrainerConfig {
        buffer_capacity: 500,
        batch_size: 16,
        steps_per_epoch: 8,
        max_epoch_sample: 64,
        target_update_freq: 5,
        seed: 11,
        ..TrainerConfig::default()
    }
}

pub fn two_phase_curriculum() -> Curriculum {
    Curriculum::new(vec![
        TrainingPhase::new("explore", 3, 1.0, 0.4),
        TrainingPhase::new("exploit", 3, 0.4, 0.05),
    ])
}

pub fn quick_trainer(config: TrainerConfig) -> Trainer<LinearQEstimator> {
    quick_trainer_with_rewards(config, RewardFunction::default())
}

pub fn quick_trainer_with_rewards(config: TrainerConfig, reward_fn: RewardFunction) -> Trainer<LinearQEstimator> {
    Trainer::new(
        LinearQEstimator::new(
            FEATURES.len(),
            LinearQConfig {
                learning_rate: 0.01,
                ..LinearQConfig::default()
            },
        ),
        reward_fn,
        two_phase_curriculum(),
        config,
    )
    .expect("valid trainer config")
}
