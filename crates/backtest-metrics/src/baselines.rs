use std::collections::BTreeMap;

use eval_core::ScoredSnapshot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EvaluationError, Result};
use crate::extended_metrics::{ExtendedBacktestMetrics, ExtendedMetricsEngine};
use crate::models::BaselineFailures;

fn default_momentum_field() -> String {
    "trailing_return".to_string()
}

/// Naive ranking strategy the primary scores are compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineStrategy {
    /// Uniformly random selection, reproducible for a given seed.
    Random { seed: u64 },
    /// Rank by a size or liquidity attribute.
    CapWeighted { field: String },
    /// Rank by a trailing-return attribute.
    Momentum {
        #[serde(default = "default_momentum_field")]
        field: String,
    },
}

impl BaselineStrategy {
    pub fn momentum() -> Self {
        BaselineStrategy::Momentum {
            field: default_momentum_field(),
        }
    }

    /// Key under which this baseline's comparison is reported.
    pub fn name(&self) -> &'static str {
        match self {
            BaselineStrategy::Random { .. } => "random",
            BaselineStrategy::CapWeighted { .. } => "cap_weighted",
            BaselineStrategy::Momentum { .. } => "momentum",
        }
    }

    /// One ranking score per snapshot, in input order.
    pub fn scores(&self, snapshots: &[ScoredSnapshot]) -> Result<Vec<f64>> {
        match self {
            BaselineStrategy::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                Ok(snapshots.iter().map(|_| rng.gen::<f64>()).collect())
            }
            BaselineStrategy::CapWeighted { field } | BaselineStrategy::Momentum { field } => snapshots
                .iter()
                .map(|s| {
                    s.attribute(field)
                        .ok_or_else(|| EvaluationError::MissingAttribute {
                            baseline: self.name().to_string(),
                            attribute: field.clone(),
                            identifier: s.identifier.clone(),
                        })
                })
                .collect(),
        }
    }
}

/// Outcome of running a set of baselines.
#[derive(Debug, Clone, Default)]
pub struct BaselineRun {
    pub results: BTreeMap<String, ExtendedBacktestMetrics>,
    pub failures: BaselineFailures,
}

/// Evaluates baseline strategies with the engine used for the primary run.
pub struct BaselineStrategyComparator<'a> {
    engine: &'a ExtendedMetricsEngine,
}

impl<'a> BaselineStrategyComparator<'a> {
    pub fn new(engine: &'a ExtendedMetricsEngine) -> Self {
        Self { engine }
    }

    pub fn evaluate(
        &self,
        strategy: &BaselineStrategy,
        snapshots: &[ScoredSnapshot],
    ) -> Result<ExtendedBacktestMetrics> {
        let scores = strategy.scores(snapshots)?;
        self.engine.calculate_extended_metrics(snapshots, &scores)
    }

    /// Run every strategy in parallel. Each failure is isolated to its own
    /// entry in `failures`. When two strategies share a name the first one
    /// listed is kept.
    pub fn evaluate_all(
        &self,
        strategies: &[BaselineStrategy],
        snapshots: &[ScoredSnapshot],
    ) -> BaselineRun {
        let outcomes: Vec<(&'static str, Result<ExtendedBacktestMetrics>)> = strategies
            .par_iter()
            .map(|strategy| (strategy.name(), self.evaluate(strategy, snapshots)))
            .collect();

        let mut run = BaselineRun::default();
        for (name, outcome) in outcomes {
            if run.results.contains_key(name) || run.failures.contains_key(name) {
                continue;
            }
            match outcome {
                Ok(metrics) => {
                    run.results.insert(name.to_string(), metrics);
                }
                Err(e) => {
                    run.failures.insert(name.to_string(), e.to_string());
                }
            }
        }

        info!(
            succeeded = run.results.len(),
            failed = run.failures.len(),
            "Baseline comparison complete"
        );
        run
    }
}
