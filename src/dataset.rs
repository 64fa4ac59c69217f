//! Row-oriented training and evaluation data.
//!
//! Features arrive already normalized. Rewards need real currency units, so
//! the schema says where the raw amount lives: either carried per row, or
//! recoverable from a log-normalized feature as `expm1(value * scale)`.

use std::path::Path;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::Outcome;
use crate::error::{FdsError, Result};

/// Scale used by the log1p amount normalization upstream.
pub const DEFAULT_AMOUNT_SCALE: f64 = 15.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountColumn {
    /// Each row carries `amount` in currency units.
    Raw,
    /// `amount = expm1(features[feature] * scale)`.
    LogNormalized { feature: String, scale: f64 },
}

impl Default for AmountColumn {
    fn default() -> Self {
        AmountColumn::LogNormalized {
            feature: "amount_normalized".to_string(),
            scale: DEFAULT_AMOUNT_SCALE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub amount: AmountColumn,
}

impl DatasetSchema {
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    fn amount_feature_index(&self) -> Result<Option<usize>> {
        match &self.amount {
            AmountColumn::Raw => Ok(None),
            AmountColumn::LogNormalized { feature, .. } => self
                .feature_names
                .iter()
                .position(|name| name == feature)
                .map(Some)
                .ok_or_else(|| {
                    FdsError::DatasetSchema(format!("amount feature '{}' not in feature columns", feature))
                }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub features: Vec<f64>,
    /// 0 = normal, 1 = fraud.
    pub label: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: DatasetSchema,
    pub rows: Vec<TransactionRow>,
}

impl Dataset {
    pub fn new(schema: DatasetSchema, rows: Vec<TransactionRow>) -> Self {
        Self { schema, rows }
    }

    /// Reads `{"schema": {..}, "rows": [..]}` and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let dataset: Dataset = serde_json::from_str(&content)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_dim(&self) -> usize {
        self.schema.width()
    }

    /// Fails on the first row that cannot be trained on. Rows are never dropped.
    pub fn validate(&self) -> Result<()> {
        if self.schema.feature_names.is_empty() {
            return Err(FdsError::DatasetSchema("no feature columns".into()));
        }
        if self.rows.is_empty() {
            return Err(FdsError::DatasetSchema("dataset has no rows".into()));
        }
        self.schema.amount_feature_index()?;
        for i in 0..self.rows.len() {
            self.validate_row(i)?;
        }
        Ok(())
    }

    fn row(&self, i: usize) -> Result<&TransactionRow> {
        self.rows.get(i).ok_or_else(|| {
            FdsError::DatasetSchema(format!("row {} out of range ({} rows)", i, self.rows.len()))
        })
    }

    pub fn validate_row(&self, i: usize) -> Result<()> {
        let row = self.row(i)?;
        if row.features.len() != self.schema.width() {
            return Err(FdsError::DatasetSchema(format!(
                "row {}: {} features, schema has {}",
                i,
                row.features.len(),
                self.schema.width()
            )));
        }
        if let Some(col) = row.features.iter().position(|v| !v.is_finite()) {
            return Err(FdsError::DatasetSchema(format!(
                "row {}: feature '{}' is not finite",
                i, self.schema.feature_names[col]
            )));
        }
        if row.label > 1 {
            return Err(FdsError::DatasetSchema(format!("row {}: label {} is not 0 or 1", i, row.label)));
        }
        self.amount(i).map(|_| ())
    }

    pub fn outcome(&self, i: usize) -> Result<Outcome> {
        let row = self.row(i)?;
        Outcome::from_label(row.label as i64)
            .map_err(|_| FdsError::DatasetSchema(format!("row {}: label {} is not 0 or 1", i, row.label)))
    }

    /// Transaction amount of row `i` in currency units.
    pub fn amount(&self, i: usize) -> Result<f64> {
        let row = self.row(i)?;
        let amount = match &self.schema.amount {
            AmountColumn::Raw => row
                .amount
                .ok_or_else(|| FdsError::DatasetSchema(format!("row {}: missing raw amount", i)))?,
            AmountColumn::LogNormalized { scale, .. } => {
                let col = self.schema.amount_feature_index()?.unwrap_or(0);
                let value = row.features.get(col).copied().ok_or_else(|| {
                    FdsError::DatasetSchema(format!("row {}: amount feature missing", i))
                })?;
                (value * scale).exp_m1()
            }
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(FdsError::DatasetSchema(format!(
                "row {}: amount {} must be finite and >= 0",
                i, amount
            )));
        }
        Ok(amount)
    }

    pub fn labels(&self) -> Vec<Outcome> {
        self.rows
            .iter()
            .map(|r| if r.label == 1 { Outcome::Fraud } else { Outcome::Normal })
            .collect()
    }

    pub fn fraud_rate(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().filter(|r| r.label == 1).count() as f64 / self.rows.len() as f64
    }

    /// Up to `max` distinct row indices, uniformly without replacement.
    pub fn sample_indices<R: Rng + ?Sized>(&self, max: usize, rng: &mut R) -> Vec<usize> {
        let n = self.rows.len().min(max);
        index::sample(rng, self.rows.len(), n).into_vec()
    }
}
