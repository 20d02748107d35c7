//! Pure, stateless statistical functions shared by the metrics engine and
//! the drift monitor.

pub mod correlation;
pub mod descriptive;
pub mod distribution;

pub use correlation::{kendall_tau, pearson, spearman, Correlation};
pub use descriptive::{average_ranks, finite_values, is_constant, mean, quantile, sample_std};
pub use distribution::{
    chi_square_test, ks_test, population_stability_index, ChiSquareResult, KsResult, PsiBand,
    DEFAULT_PSI_BINS, PSI_EPSILON,
};
