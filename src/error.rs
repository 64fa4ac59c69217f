use thiserror::Error;

#[derive(Error, Debug)]
pub enum FdsError {
    #[error("RewardFunction: invalid action ordinal {0} (expected 0, 1 or 2)")]
    InvalidAction(i64),

    #[error("RewardFunction: invalid outcome label {0} (expected 0 or 1)")]
    InvalidOutcome(i64),

    #[error("RewardFunction: invalid amount {0} (must be finite and >= 0)")]
    InvalidAmount(f64),

    #[error("RewardFunction: invalid fraud probability {0} (must lie in [0, 1])")]
    InvalidProbability(f64),

    #[error("ReplayBuffer: insufficient experience ({available} stored < {requested} requested)")]
    InsufficientExperience { available: usize, requested: usize },

    #[error("Checkpoint corrupted: {0}")]
    CheckpointCorruption(String),

    #[error("Dataset schema error: {0}")]
    DatasetSchema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Estimator error: {0}")]
    Estimator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, FdsError>;
