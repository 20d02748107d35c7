//! Evaluation of a scoring strategy against realized outcomes: information
//! coefficients, risk-adjusted returns of the top-ranked selection, and
//! comparison against naive baselines.

pub mod baselines;
pub mod error;
pub mod extended_metrics;
pub mod ic;
pub mod models;
pub mod risk;

pub use baselines::{BaselineRun, BaselineStrategy, BaselineStrategyComparator};
pub use error::{EvaluationError, Stage};
pub use extended_metrics::{compare_extended_metrics, ExtendedBacktestMetrics, ExtendedMetricsEngine};
pub use ic::InformationCoefficientCalculator;
pub use models::*;
pub use risk::RiskMetricsCalculator;

#[cfg(test)]
mod tests;
