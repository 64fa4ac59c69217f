//! Turns action sequences into classification, business and per-action metrics.
//!
//! MANUAL_REVIEW and BLOCK both count as a positive (flagged) prediction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::action::{Action, Outcome};
use crate::checkpoint::write_atomic;
use crate::config::BusinessMetricsConfig;
use crate::dataset::Dataset;
use crate::error::{FdsError, Result};
use crate::policy::argmax_action;
use crate::traits::ValueEstimator;

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionCounts {
    pub fn from_actions(actions: &[Action], outcomes: &[Outcome]) -> Result<Self> {
        check_lengths(actions, outcomes)?;
        let mut counts = ConfusionCounts::default();
        for (action, outcome) in actions.iter().zip(outcomes) {
            match (action.is_flagged(), outcome.is_fraud()) {
                (true, true) => counts.tp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fp += 1,
                (false, true) => counts.fn_ += 1,
            }
        }
        Ok(counts)
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

fn check_lengths(actions: &[Action], outcomes: &[Outcome]) -> Result<()> {
    if actions.len() != outcomes.len() {
        return Err(FdsError::DatasetSchema(format!(
            "{} actions but {} outcomes",
            actions.len(),
            outcomes.len()
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub confusion_matrix: ConfusionCounts,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub fpr: f64,
    pub accuracy: f64,
}

impl From<ConfusionCounts> for PerformanceMetrics {
    fn from(cm: ConfusionCounts) -> Self {
        let precision = ratio(cm.tp as f64, (cm.tp + cm.fp) as f64);
        let recall = ratio(cm.tp as f64, (cm.tp + cm.fn_) as f64);
        Self {
            confusion_matrix: cm,
            precision,
            recall,
            f1_score: ratio(2.0 * precision * recall, precision + recall),
            fpr: ratio(cm.fp as f64, (cm.fp + cm.tn) as f64),
            accuracy: ratio((cm.tp + cm.tn) as f64, cm.total() as f64),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FraudLoss {
    pub baseline_loss: f64,
    pub model_loss: f64,
    pub loss_reduction: f64,
    pub reduction_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewEfficiency {
    pub review_count: usize,
    pub review_fraud_count: usize,
    pub review_precision: f64,
    pub total_review_cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerFriction {
    pub false_positives: usize,
    pub block_count: usize,
    pub friction_cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub total_benefits: f64,
    pub total_costs: f64,
    pub net_benefit: f64,
    pub roi: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub fraud_loss: FraudLoss,
    pub review_efficiency: ReviewEfficiency,
    pub customer_friction: CustomerFriction,
    pub roi: Roi,
}

impl BusinessMetrics {
    pub fn compute(
        config: &BusinessMetricsConfig,
        cm: &ConfusionCounts,
        actions: &[Action],
        outcomes: &[Outcome],
    ) -> Result<Self> {
        check_lengths(actions, outcomes)?;

        let baseline_loss = (cm.tp + cm.fn_) as f64 * config.avg_fraud_amount;
        let model_loss = cm.fn_ as f64 * config.avg_fraud_amount;
        let loss_reduction = baseline_loss - model_loss;
        let fraud_loss = FraudLoss {
            baseline_loss,
            model_loss,
            loss_reduction,
            reduction_rate: ratio(loss_reduction, baseline_loss),
        };

        let review_count = actions.iter().filter(|a| **a == Action::ManualReview).count();
        let review_fraud_count = actions
            .iter()
            .zip(outcomes)
            .filter(|(a, o)| **a == Action::ManualReview && o.is_fraud())
            .count();
        let review_efficiency = ReviewEfficiency {
            review_count,
            review_fraud_count,
            review_precision: ratio(review_fraud_count as f64, review_count as f64),
            total_review_cost: review_count as f64 * config.manual_review_cost,
        };

        let customer_friction = CustomerFriction {
            false_positives: cm.fp,
            block_count: actions.iter().filter(|a| **a == Action::Block).count(),
            friction_cost: cm.fp as f64 * config.false_block_cost,
        };

        let total_costs = review_efficiency.total_review_cost + customer_friction.friction_cost;
        let net_benefit = loss_reduction - total_costs;
        let roi = Roi {
            total_benefits: loss_reduction,
            total_costs,
            net_benefit,
            roi: ratio(net_benefit, total_costs),
        };

        Ok(Self {
            fraud_loss,
            review_efficiency,
            customer_friction,
            roi,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDistribution {
    pub approve: f64,
    pub manual_review: f64,
    pub block: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionAccuracy {
    pub count: usize,
    pub fraud_count: usize,
    pub normal_count: usize,
    pub fraud_rate: f64,
    pub normal_rate: f64,
}

/// Action mix and what each action actually caught.
pub struct ActionMonitor;

impl ActionMonitor {
    pub fn distribution(actions: &[Action]) -> ActionDistribution {
        let total = actions.len() as f64;
        let share = |target: Action| ratio(actions.iter().filter(|a| **a == target).count() as f64, total);
        ActionDistribution {
            approve: share(Action::Approve),
            manual_review: share(Action::ManualReview),
            block: share(Action::Block),
        }
    }

    /// Keyed by lowercase action name. Unused actions report zero rates.
    pub fn accuracy(actions: &[Action], outcomes: &[Outcome]) -> Result<BTreeMap<String, ActionAccuracy>> {
        check_lengths(actions, outcomes)?;
        let mut out = BTreeMap::new();
        for action in Action::ALL {
            let mut acc = ActionAccuracy::default();
            for (a, o) in actions.iter().zip(outcomes) {
                if *a == action {
                    acc.count += 1;
                    if o.is_fraud() {
                        acc.fraud_count += 1;
                    } else {
                        acc.normal_count += 1;
                    }
                }
            }
            acc.fraud_rate = ratio(acc.fraud_count as f64, acc.count as f64);
            acc.normal_rate = ratio(acc.normal_count as f64, acc.count as f64);
            out.insert(action.as_str().to_string(), acc);
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub sample_count: usize,
    /// Share of fraud labels in the evaluated sample.
    pub label_rate: f64,
    /// RFC 3339.
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub performance: PerformanceMetrics,
    pub business: BusinessMetrics,
    pub action_distribution: ActionDistribution,
    pub action_accuracy: BTreeMap<String, ActionAccuracy>,
    pub metadata: ReportMetadata,
}

impl EvaluationReport {
    /// Writes `evaluation_<timestamp>.json` into `dir` and returns its path.
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("evaluation_{}.json", stamp));
        write_atomic(&path, &serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "evaluation report saved");
        Ok(path)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}\nEVALUATION SUMMARY\n{}", rule, rule)?;
        let perf = &self.performance;
        writeln!(f, "\nPerformance")?;
        writeln!(f, "  precision  {:.4}", perf.precision)?;
        writeln!(f, "  recall     {:.4}", perf.recall)?;
        writeln!(f, "  f1         {:.4}", perf.f1_score)?;
        writeln!(f, "  fpr        {:.4}", perf.fpr)?;
        writeln!(f, "  accuracy   {:.4}", perf.accuracy)?;

        let biz = &self.business;
        writeln!(f, "\nBusiness")?;
        writeln!(f, "  fraud loss reduction  {:.2}%", biz.fraud_loss.reduction_rate * 100.0)?;
        writeln!(f, "  amount saved          {:.0}", biz.fraud_loss.loss_reduction)?;
        writeln!(f, "  roi                   {:.2}x", biz.roi.roi)?;
        writeln!(f, "  net benefit           {:.0}", biz.roi.net_benefit)?;

        let dist = &self.action_distribution;
        writeln!(f, "\nActions")?;
        writeln!(f, "  APPROVE        {:.2}%", dist.approve * 100.0)?;
        writeln!(f, "  MANUAL_REVIEW  {:.2}%", dist.manual_review * 100.0)?;
        writeln!(f, "  BLOCK          {:.2}%", dist.block * 100.0)?;
        write!(f, "\n{} samples, fraud rate {:.4}", self.metadata.sample_count, self.metadata.label_rate)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Evaluator {
    business: BusinessMetricsConfig,
}

impl Evaluator {
    pub fn new(business: BusinessMetricsConfig) -> Self {
        Self { business }
    }

    pub fn confusion_counts(&self, actions: &[Action], outcomes: &[Outcome]) -> Result<ConfusionCounts> {
        ConfusionCounts::from_actions(actions, outcomes)
    }

    pub fn evaluate_actions(&self, actions: &[Action], outcomes: &[Outcome]) -> Result<EvaluationReport> {
        let cm = ConfusionCounts::from_actions(actions, outcomes)?;
        let performance = PerformanceMetrics::from(cm);
        let business = BusinessMetrics::compute(&self.business, &cm, actions, outcomes)?;
        let fraud = outcomes.iter().filter(|o| o.is_fraud()).count();
        Ok(EvaluationReport {
            performance,
            business,
            action_distribution: ActionMonitor::distribution(actions),
            action_accuracy: ActionMonitor::accuracy(actions, outcomes)?,
            metadata: ReportMetadata {
                sample_count: outcomes.len(),
                label_rate: ratio(fraud as f64, outcomes.len() as f64),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        })
    }

    /// Greedy replay of `estimator` over every row of `dataset`.
    pub fn evaluate<E: ValueEstimator>(&self, estimator: &E, dataset: &Dataset) -> Result<EvaluationReport> {
        dataset.validate()?;
        if dataset.feature_dim() != estimator.feature_dim() {
            return Err(FdsError::DatasetSchema(format!(
                "dataset has {} feature columns, estimator expects {}",
                dataset.feature_dim(),
                estimator.feature_dim()
            )));
        }
        info!(rows = dataset.len(), "evaluating estimator");
        let states: Vec<Vec<f64>> = dataset.rows.iter().map(|r| r.features.clone()).collect();
        let actions: Vec<Action> = estimator
            .predict_batch(&states)?
            .iter()
            .map(argmax_action)
            .collect();
        let report = self.evaluate_actions(&actions, &dataset.labels())?;
        info!(
            precision = report.performance.precision,
            recall = report.performance.recall,
            f1 = report.performance.f1_score,
            "evaluation complete"
        );
        Ok(report)
    }
}
