use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftError {
    #[error("no baseline set for target '{target}'")]
    NoBaseline { target: String },

    /// The held baseline exceeded the configured maximum age and was dropped.
    #[error("baseline for '{target}' is stale: {age_days} days old, limit {max_age_days} days")]
    StaleBaseline {
        target: String,
        age_days: i64,
        max_age_days: i64,
    },

    #[error("invalid drift thresholds: {0}")]
    InvalidThresholds(String),

    #[error("baseline storage failed: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("baseline payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DriftError>;
