use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn unresolved() -> f64 {
    f64::NAN
}

/// One scored asset observation produced by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSnapshot {
    pub identifier: String,
    pub predicted_score: f64,
    /// NaN until the prediction horizon has elapsed.
    #[serde(with = "crate::sentinel", default = "unresolved")]
    pub realized_return: f64,
    #[serde(default)]
    pub period_label: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Auxiliary ranking fields such as `liquidity` or `trailing_return`.
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl ScoredSnapshot {
    pub fn new(
        identifier: impl Into<String>,
        predicted_score: f64,
        realized_return: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            predicted_score,
            realized_return,
            period_label: None,
            timestamp,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_period(mut self, label: impl Into<String>) -> Self {
        self.period_label = Some(label.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Whether the realized return is known.
    pub fn is_resolved(&self) -> bool {
        self.realized_return.is_finite()
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }
}

/// Flat metric-name → value mapping that alert rules are evaluated against.
///
/// Keys are dotted paths (`risk.sharpe_ratio`, `drift.feature.volume.psi`).
/// Boolean facts are stored as `1.0` / `0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    values: BTreeMap<String, f64>,
}

impl MetricsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn insert_flag(&mut self, key: impl Into<String>, flag: bool) {
        self.insert(key, if flag { 1.0 } else { 0.0 });
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    /// Merge another snapshot into this one; keys in `other` win.
    pub fn merge(&mut self, other: MetricsSnapshot) {
        self.values.extend(other.values);
    }

    /// The set of keys present in this snapshot.
    pub fn schema(&self) -> MetricsSchema {
        MetricsSchema::from_keys(self.values.keys().cloned())
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.values
    }
}

impl From<BTreeMap<String, f64>> for MetricsSnapshot {
    fn from(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }
}

impl Serialize for MetricsSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        crate::sentinel::map::serialize(&self.values, serializer)
    }
}

impl<'de> Deserialize<'de> for MetricsSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        crate::sentinel::map::deserialize(deserializer).map(|values| Self { values })
    }
}

/// The metric keys a pipeline is known to produce. Used to reject alert
/// rules that reference metrics which will never exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSchema {
    keys: BTreeSet<String>,
}

impl MetricsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn extend(&mut self, other: MetricsSchema) {
        self.keys.extend(other.keys);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }
}
