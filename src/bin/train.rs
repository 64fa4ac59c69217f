use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use fds_core::analyzer::DEFAULT_THRESHOLD_RESOLUTION;
use fds_core::tuning::{ParamSpace, SearchSettings};
use fds_core::{
    Curriculum, Dataset, Evaluator, FdsConfig, HyperparameterSearch, LinearQConfig, LinearQEstimator, RewardAnalyzer,
    RewardFunction, Trainer, ValueEstimator,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Fraud-screening RL trainer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML or JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    seed: Option<u64>,

    #[arg(long, global = true)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a fresh estimator over the configured curriculum.
    Train {
        #[arg(long)]
        data: PathBuf,
        /// Multiply every phase's epoch count (e.g. 0.1 for a quick run).
        #[arg(long)]
        epochs_scale: Option<f64>,
        #[arg(long, default_value_t = 1e-3)]
        learning_rate: f64,
    },
    /// Continue training from a checkpoint directory.
    Resume {
        #[arg(long)]
        checkpoint: PathBuf,
        #[arg(long)]
        data: PathBuf,
    },
    /// Greedy evaluation of a saved estimator.
    Evaluate {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        data: PathBuf,
    },
    /// Print the reward matrix summary and decision thresholds.
    Rewards {
        #[arg(long, default_value_t = 1_000_000.0)]
        amount: f64,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_RESOLUTION)]
        resolution: usize,
    },
    /// Random hyperparameter search.
    Tune {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        validation: PathBuf,
        #[arg(long, default_value_t = 10)]
        trials: usize,
        #[arg(long, default_value_t = 10)]
        epochs_per_trial: u64,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FdsConfig> {
    match path {
        Some(p) => FdsConfig::from_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(FdsConfig::default()),
    }
}

fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    Dataset::from_json_file(path).with_context(|| format!("loading dataset {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    fds_core::checkpoint::write_atomic(path, &serde_json::to_vec_pretty(value)?)?;
    info!(path = %path.display(), "wrote");
    Ok(())
}

fn finish_training(trainer: &Trainer<LinearQEstimator>, out_dir: &Path) -> anyhow::Result<()> {
    trainer.estimator().save(&out_dir.join("final_model.json"))?;
    trainer.write_history_json(&out_dir.join("training_history.json"))?;
    write_json(&out_dir.join("metrics_summary.json"), &trainer.metrics_summary())?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(seed) = cli.seed {
        config.trainer.seed = seed;
    }
    let out_dir = cli.out.unwrap_or_else(|| PathBuf::from("outputs"));
    fs::create_dir_all(&out_dir)?;

    match cli.command {
        Commands::Train {
            data,
            epochs_scale,
            learning_rate,
        } => {
            let dataset = load_dataset(&data)?;
            if let Some(scale) = epochs_scale {
                config.phases = config
                    .phases
                    .iter()
                    .map(|phase| phase.scaled(scale))
                    .collect::<Result<_, _>>()
                    .context("--epochs-scale")?;
            }
            if config.trainer.checkpoint_dir.is_none() {
                config.trainer.checkpoint_dir = Some(out_dir.join("checkpoints"));
            }
            let estimator = LinearQEstimator::new(
                dataset.feature_dim(),
                LinearQConfig {
                    learning_rate,
                    seed: config.trainer.seed,
                    ..LinearQConfig::default()
                },
            );
            let mut trainer = Trainer::new(
                estimator,
                RewardFunction::new(config.rewards),
                Curriculum::from_config(&config.phases),
                config.trainer.clone(),
            )?;
            let summary = trainer.train(&dataset)?;
            finish_training(&trainer, &out_dir)?;
            println!(
                "Training complete: {} epochs, {} gradient steps, final loss {:.4}",
                summary.epochs_run, summary.total_gradient_steps, summary.final_loss
            );
        }
        Commands::Resume { checkpoint, data } => {
            let dataset = load_dataset(&data)?;
            let mut trainer = Trainer::<LinearQEstimator>::from_checkpoint(&checkpoint)
                .with_context(|| format!("restoring {}", checkpoint.display()))?;
            let summary = trainer.train(&dataset)?;
            finish_training(&trainer, &out_dir)?;
            println!(
                "Resumed run complete: {} more epochs, {} gradient steps total",
                summary.epochs_run, summary.total_gradient_steps
            );
        }
        Commands::Evaluate { model, data } => {
            let dataset = load_dataset(&data)?;
            let estimator = LinearQEstimator::load(&model).with_context(|| format!("loading model {}", model.display()))?;
            let report = Evaluator::new(config.business.clone()).evaluate(&estimator, &dataset)?;
            report.write_json(&out_dir)?;
            println!("{}", report);
        }
        Commands::Rewards { amount, resolution } => {
            let reward_fn = RewardFunction::new(config.rewards);
            println!("{}", reward_fn.summary(amount)?);
            let thresholds = RewardAnalyzer::new(&reward_fn).decision_thresholds(amount, resolution)?;
            if thresholds.is_empty() {
                println!("No decision thresholds at amount {:.0}: one action dominates", amount);
            }
            for (transition, p) in &thresholds {
                println!("{:<32} p = {:.4}", transition, p);
            }
            write_json(&out_dir.join("decision_thresholds.json"), &thresholds)?;
        }
        Commands::Tune {
            data,
            validation,
            trials,
            epochs_per_trial,
        } => {
            let train = load_dataset(&data)?;
            let val = load_dataset(&validation)?;
            let seed = config.trainer.seed;
            let mut search = HyperparameterSearch::new(
                &train,
                &val,
                RewardFunction::new(config.rewards),
                config.trainer.clone(),
                SearchSettings {
                    epochs_per_trial,
                    ..SearchSettings::default()
                },
                |params: &fds_core::tuning::TrialParams, dim: usize| {
                    LinearQEstimator::new(
                        dim,
                        LinearQConfig {
                            learning_rate: params.learning_rate,
                            seed,
                            ..LinearQConfig::default()
                        },
                    )
                },
            );
            let results = search.random(&ParamSpace::default(), trials, seed)?;
            write_json(&out_dir.join("tuning_results.json"), &results)?;
            let best = search.best()?;
            write_json(&out_dir.join("best_params.json"), &best.params)?;
            println!(
                "Best trial: val_avg_reward {:.3}, accuracy {:.3}, params {:?}",
                best.scores.val_avg_reward, best.scores.val_accuracy, best.params
            );
        }
    }

    Ok(())
}
