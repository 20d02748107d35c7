use thiserror::Error;

/// Rule definitions that cannot be loaded. Raised before any evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{operator} requires at least 2 sub-conditions, got {count}")]
    TooFewConditions { operator: &'static str, count: usize },

    #[error("NOT requires exactly 1 sub-condition, got {count}")]
    NotArity { count: usize },

    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown logical operator '{0}'")]
    UnknownLogicalOperator(String),

    #[error("condition is missing '{0}'")]
    MissingField(&'static str),

    #[error("duplicate rule id '{0}'")]
    DuplicateRuleId(String),

    #[error("rule '{rule}' has an invalid escalation policy: {reason}")]
    InvalidEscalation { rule: String, reason: String },

    #[error("rule '{rule}' references metric '{metric}' which the pipeline does not produce")]
    UnknownMetric { rule: String, metric: String },

    #[error("rule '{rule}' is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("could not parse alert rules: {0}")]
    Parse(String),
}

/// Per-rule failure during an evaluation sweep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlertError {
    #[error("metric '{metric}' is missing from the evaluation context")]
    MissingMetric { metric: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("alert state storage failed: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("alert state payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),
}
