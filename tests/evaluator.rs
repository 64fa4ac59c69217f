mod common;

use common::synthetic_dataset;
use fds_core::evaluator::{ActionMonitor, EvaluationReport};
use fds_core::{Action, BusinessMetricsConfig, Evaluator, FdsError, LinearQConfig, LinearQEstimator, Outcome};
use tempfile::tempdir;

fn actions(ordinals: &[i64]) -> Vec<Action> {
    ordinals.iter().map(|&a| Action::from_index(a).unwrap()).collect()
}

fn outcomes(labels: &[i64]) -> Vec<Outcome> {
    labels.iter().map(|&l| Outcome::from_label(l).unwrap()).collect()
}

#[test]
fn perfect_predictions_score_one() {
    let evaluator = Evaluator::default();
    let report = evaluator
        .evaluate_actions(&actions(&[0, 0, 1, 1]), &outcomes(&[0, 0, 1, 1]))
        .unwrap();
    let cm = report.performance.confusion_matrix;
    assert_eq!((cm.tp, cm.tn, cm.fp, cm.fn_), (2, 2, 0, 0));
    assert_eq!(report.performance.precision, 1.0);
    assert_eq!(report.performance.recall, 1.0);
    assert_eq!(report.performance.f1_score, 1.0);
    assert_eq!(report.performance.accuracy, 1.0);
    assert_eq!(report.performance.fpr, 0.0);
}

#[test]
fn block_counts_as_positive() {
    let cm = Evaluator::default()
        .confusion_counts(&actions(&[2, 2, 0]), &outcomes(&[1, 0, 1]))
        .unwrap();
    assert_eq!((cm.tp, cm.tn, cm.fp, cm.fn_), (1, 0, 1, 1));
}

#[test]
fn all_approve_on_frauds_has_zero_precision_and_full_baseline_loss() {
    let evaluator = Evaluator::new(BusinessMetricsConfig::default());
    let report = evaluator
        .evaluate_actions(&actions(&[0, 0, 0]), &outcomes(&[1, 1, 0]))
        .unwrap();
    assert_eq!(report.performance.precision, 0.0);
    assert_eq!(report.performance.recall, 0.0);
    assert_eq!(report.business.fraud_loss.model_loss, 1_000_000.0);
    assert_eq!(report.business.fraud_loss.reduction_rate, 0.0);
    assert_eq!(report.business.roi.roi, 0.0);
    assert_eq!(report.action_accuracy["manual_review"].count, 0);
    assert_eq!(report.action_accuracy["manual_review"].normal_rate, 0.0);
}

#[test]
fn empty_input_yields_zeros_not_nan() {
    let report = Evaluator::default().evaluate_actions(&[], &[]).unwrap();
    assert_eq!(report.performance.accuracy, 0.0);
    assert_eq!(report.action_distribution.approve, 0.0);
    assert_eq!(report.metadata.label_rate, 0.0);
}

#[test]
fn mismatched_lengths_are_schema_errors() {
    let err = Evaluator::default()
        .evaluate_actions(&actions(&[0, 1]), &outcomes(&[0]))
        .unwrap_err();
    assert!(matches!(err, FdsError::DatasetSchema(_)));
}

#[test]
fn distribution_sums_to_one() {
    let dist = ActionMonitor::distribution(&actions(&[0, 1, 2, 2]));
    assert_eq!(dist.block, 0.5);
    assert!((dist.approve + dist.manual_review + dist.block - 1.0).abs() < 1e-12);
}

#[test]
fn report_json_has_expected_sections() {
    let dir = tempdir().unwrap();
    let data = synthetic_dataset(40, 0.3, 17);
    let estimator = LinearQEstimator::new(data.feature_dim(), LinearQConfig::default());
    let report = Evaluator::default().evaluate(&estimator, &data).unwrap();
    let path = report.write_json(dir.path()).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    for section in ["performance", "business", "action_distribution", "action_accuracy", "metadata"] {
        assert!(value.get(section).is_some(), "missing {}", section);
    }
    assert_eq!(value["metadata"]["sample_count"], 40);
    assert!(chrono::DateTime::parse_from_rfc3339(value["metadata"]["timestamp"].as_str().unwrap()).is_ok());

    let parsed: EvaluationReport = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.performance, report.performance);
    assert!(report.to_string().contains("EVALUATION SUMMARY"));
}

#[test]
fn estimator_width_mismatch_is_rejected() {
    let data = synthetic_dataset(10, 0.3, 1);
    let estimator = LinearQEstimator::new(data.feature_dim() + 1, LinearQConfig::default());
    assert!(matches!(
        Evaluator::default().evaluate(&estimator, &data),
        Err(FdsError::DatasetSchema(_))
    ));
}
