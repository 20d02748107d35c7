use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use eval_core::MetricsSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, ConfigurationError};

/// Absolute tolerance for `eq` / `ne`.
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComparisonOperator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Le => "le",
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Ge => "ge",
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
        }
    }

    /// A NaN value satisfies only `ne`.
    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        if value.is_nan() || threshold.is_nan() {
            return *self == ComparisonOperator::Ne;
        }
        let equal = value == threshold || (value - threshold).abs() <= EQUALITY_TOLERANCE;
        match self {
            ComparisonOperator::Lt => value < threshold,
            ComparisonOperator::Le => value <= threshold,
            ComparisonOperator::Gt => value > threshold,
            ComparisonOperator::Ge => value >= threshold,
            ComparisonOperator::Eq => equal,
            ComparisonOperator::Ne => !equal,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lt" | "<" => Ok(ComparisonOperator::Lt),
            "le" | "<=" => Ok(ComparisonOperator::Le),
            "gt" | ">" => Ok(ComparisonOperator::Gt),
            "ge" | ">=" => Ok(ComparisonOperator::Ge),
            "eq" | "==" => Ok(ComparisonOperator::Eq),
            "ne" | "!=" => Ok(ComparisonOperator::Ne),
            _ => Err(ConfigurationError::UnknownOperator(s.to_string())),
        }
    }
}

impl TryFrom<String> for ComparisonOperator {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComparisonOperator> for String {
    fn from(op: ComparisonOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        }
    }

    fn check_arity(&self, count: usize) -> Result<(), ConfigurationError> {
        match self {
            LogicalOperator::And | LogicalOperator::Or if count < 2 => {
                Err(ConfigurationError::TooFewConditions {
                    operator: self.as_str(),
                    count,
                })
            }
            LogicalOperator::Not if count != 1 => Err(ConfigurationError::NotArity { count }),
            _ => Ok(()),
        }
    }
}

impl FromStr for LogicalOperator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "&&" => Ok(LogicalOperator::And),
            "OR" | "||" => Ok(LogicalOperator::Or),
            "NOT" | "!" => Ok(LogicalOperator::Not),
            _ => Err(ConfigurationError::UnknownLogicalOperator(s.to_string())),
        }
    }
}

/// Boolean condition tree over a [`MetricsSnapshot`].
///
/// Deserialization validates operators and arity, so a loaded tree is always
/// well formed. Trees built directly from the variants should go through
/// [`AlertCondition::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub enum AlertCondition {
    Simple {
        metric: String,
        operator: ComparisonOperator,
        threshold: f64,
    },
    Compound {
        operator: LogicalOperator,
        conditions: Vec<AlertCondition>,
    },
}

impl AlertCondition {
    pub fn simple(metric: impl Into<String>, operator: ComparisonOperator, threshold: f64) -> Self {
        AlertCondition::Simple {
            metric: metric.into(),
            operator,
            threshold,
        }
    }

    pub fn compound(
        operator: LogicalOperator,
        conditions: Vec<AlertCondition>,
    ) -> Result<Self, ConfigurationError> {
        operator.check_arity(conditions.len())?;
        Ok(AlertCondition::Compound {
            operator,
            conditions,
        })
    }

    pub fn all(conditions: Vec<AlertCondition>) -> Result<Self, ConfigurationError> {
        Self::compound(LogicalOperator::And, conditions)
    }

    pub fn any(conditions: Vec<AlertCondition>) -> Result<Self, ConfigurationError> {
        Self::compound(LogicalOperator::Or, conditions)
    }

    pub fn negate(condition: AlertCondition) -> Self {
        AlertCondition::Compound {
            operator: LogicalOperator::Not,
            conditions: vec![condition],
        }
    }

    /// Check arity of every compound node.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            AlertCondition::Simple { .. } => Ok(()),
            AlertCondition::Compound {
                operator,
                conditions,
            } => {
                operator.check_arity(conditions.len())?;
                conditions.iter().try_for_each(AlertCondition::validate)
            }
        }
    }

    /// Evaluate against `metrics`. AND and OR short-circuit, so a missing
    /// metric behind a decided branch is not reported.
    pub fn evaluate(&self, metrics: &MetricsSnapshot) -> Result<bool, AlertError> {
        match self {
            AlertCondition::Simple {
                metric,
                operator,
                threshold,
            } => {
                let value = metrics.get(metric).ok_or_else(|| AlertError::MissingMetric {
                    metric: metric.clone(),
                })?;
                Ok(operator.apply(value, *threshold))
            }
            AlertCondition::Compound {
                operator,
                conditions,
            } => match operator {
                LogicalOperator::And => {
                    for condition in conditions {
                        if !condition.evaluate(metrics)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                LogicalOperator::Or => {
                    for condition in conditions {
                        if condition.evaluate(metrics)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOperator::Not => match conditions.first() {
                    Some(condition) => Ok(!condition.evaluate(metrics)?),
                    None => Ok(false),
                },
            },
        }
    }

    /// Every metric key the tree can read.
    pub fn referenced_metrics(&self) -> BTreeSet<&str> {
        let mut keys = BTreeSet::new();
        self.collect_metrics(&mut keys);
        keys
    }

    fn collect_metrics<'a>(&'a self, keys: &mut BTreeSet<&'a str>) {
        match self {
            AlertCondition::Simple { metric, .. } => {
                keys.insert(metric.as_str());
            }
            AlertCondition::Compound { conditions, .. } => {
                for condition in conditions {
                    condition.collect_metrics(keys);
                }
            }
        }
    }
}

/// Wire form of a condition node: a leaf carries `metric` and `threshold`,
/// an inner node carries `conditions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCondition {
    operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conditions: Option<Vec<AlertCondition>>,
}

impl TryFrom<RawCondition> for AlertCondition {
    type Error = ConfigurationError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        match raw.conditions {
            Some(conditions) => AlertCondition::compound(raw.operator.parse()?, conditions),
            None => {
                let metric = raw.metric.ok_or(ConfigurationError::MissingField("metric"))?;
                let threshold = raw
                    .threshold
                    .ok_or(ConfigurationError::MissingField("threshold"))?;
                Ok(AlertCondition::simple(metric, raw.operator.parse()?, threshold))
            }
        }
    }
}

impl From<AlertCondition> for RawCondition {
    fn from(condition: AlertCondition) -> Self {
        match condition {
            AlertCondition::Simple {
                metric,
                operator,
                threshold,
            } => RawCondition {
                operator: operator.as_str().to_string(),
                metric: Some(metric),
                threshold: Some(threshold),
                conditions: None,
            },
            AlertCondition::Compound {
                operator,
                conditions,
            } => RawCondition {
                operator: operator.as_str().to_string(),
                metric: None,
                threshold: None,
                conditions: Some(conditions),
            },
        }
    }
}
