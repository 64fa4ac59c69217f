use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FdsError, Result};

/// Decision assigned to a transaction.
///
/// Ordinal order matters: anything at or above `ManualReview` counts as
/// "flagged" when scoring.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Action {
    #[default]
    Approve,
    ManualReview,
    Block,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Approve, Action::ManualReview, Action::Block];
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Action::Approve => 0,
            Action::ManualReview => 1,
            Action::Block => 2,
        }
    }

    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Action::Approve),
            1 => Ok(Action::ManualReview),
            2 => Ok(Action::Block),
            other => Err(FdsError::InvalidAction(other)),
        }
    }

    pub fn is_flagged(self) -> bool {
        self >= Action::ManualReview
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::ManualReview => "manual_review",
            Action::Block => "block",
        }
    }

    /// Upper-case name used in threshold keys such as `APPROVE_TO_BLOCK`.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Approve => "APPROVE",
            Action::ManualReview => "MANUAL_REVIEW",
            Action::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Action::Approve),
            "manual_review" => Ok(Action::ManualReview),
            "block" => Ok(Action::Block),
            _ => Err(format!("Invalid action: {}", s)),
        }
    }
}

/// Ground-truth label of a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Normal,
    Fraud,
}

impl Outcome {
    pub const ALL: [Outcome; 2] = [Outcome::Normal, Outcome::Fraud];

    pub fn index(self) -> usize {
        match self {
            Outcome::Normal => 0,
            Outcome::Fraud => 1,
        }
    }

    pub fn from_label(label: i64) -> Result<Self> {
        match label {
            0 => Ok(Outcome::Normal),
            1 => Ok(Outcome::Fraud),
            other => Err(FdsError::InvalidOutcome(other)),
        }
    }

    pub fn is_fraud(self) -> bool {
        self == Outcome::Fraud
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Normal => "normal",
            Outcome::Fraud => "fraud",
        }
    }
}
