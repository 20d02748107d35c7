use std::fmt;

use eval_core::StatsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sub-computation of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InformationCoefficient,
    RiskMetrics,
    Classification,
    Baseline,
}

impl Stage {
    /// Key used in exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InformationCoefficient => "information_coefficient",
            Stage::RiskMetrics => "risk_metrics",
            Stage::Classification => "classification",
            Stage::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::InformationCoefficient => "IC",
            Stage::RiskMetrics => "risk metrics",
            Stage::Classification => "classification",
            Stage::Baseline => "baseline",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("dimension mismatch: {snapshots} snapshots vs {predictions} predictions")]
    DimensionMismatch { snapshots: usize, predictions: usize },

    #[error("{stage} calculation failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StatsError,
    },

    #[error("invalid evaluation parameters: {0}")]
    InvalidParams(String),

    #[error("baseline '{baseline}' requires attribute '{attribute}', missing on {identifier}")]
    MissingAttribute {
        baseline: String,
        attribute: String,
        identifier: String,
    },
}

impl EvaluationError {
    pub fn stage(stage: Stage, source: StatsError) -> Self {
        EvaluationError::Stage { stage, source }
    }

    /// The failing stage, if the error came from a sub-computation.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            EvaluationError::Stage { stage, .. } => Some(*stage),
            EvaluationError::MissingAttribute { .. } => Some(Stage::Baseline),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;
