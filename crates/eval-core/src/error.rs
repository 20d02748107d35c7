use thiserror::Error;

/// Input-contract violations raised at the boundary of a statistical
/// computation. Degenerate-but-valid outcomes (constant input, zero
/// volatility) are reported as NaN/Infinity values, never as errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("insufficient data, n={n}")]
    InsufficientData { n: usize },

    /// Paired samples of different lengths. Part of the insufficient-data
    /// family: a pair cannot be formed for the unmatched tail.
    #[error("insufficient data: paired samples differ in length ({left} vs {right})")]
    UnequalLengths { left: usize, right: usize },

    #[error("dimension mismatch: {context} ({left} vs {right})")]
    DimensionMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl StatsError {
    /// True for both `InsufficientData` and `UnequalLengths`.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            StatsError::InsufficientData { .. } | StatsError::UnequalLengths { .. }
        )
    }

    pub fn dimension_mismatch(context: &'static str, left: usize, right: usize) -> Self {
        StatsError::DimensionMismatch {
            context,
            left,
            right,
        }
    }
}
