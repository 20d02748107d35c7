use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use eval_core::{sentinel, MetricsSchema, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::condition::AlertCondition;
use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raise the alert to `severity` once it has been active for `after_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub after_seconds: u64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub condition: AlertCondition,
    pub severity: Severity,
    /// How long the alert stays active after its last trigger.
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub escalation: Vec<EscalationStep>,
    /// Metric keys whose values distinguish one incident from another.
    #[serde(default)]
    pub fingerprint_fields: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl AlertRule {
    pub fn new(id: impl Into<String>, condition: AlertCondition, severity: Severity) -> Self {
        Self {
            id: id.into(),
            condition,
            severity,
            cooldown_seconds: 0,
            escalation: Vec::new(),
            fingerprint_fields: Vec::new(),
            description: None,
        }
    }

    pub fn with_cooldown(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn with_escalation(mut self, steps: Vec<EscalationStep>) -> Self {
        self.escalation = steps;
        self
    }

    pub fn with_fingerprint_fields(mut self, fields: Vec<String>) -> Self {
        self.fingerprint_fields = fields;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cooldown(&self) -> Duration {
        let max_seconds = (i64::MAX / 1000) as u64;
        Duration::seconds(self.cooldown_seconds.min(max_seconds) as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::InvalidRule {
                rule: self.id.clone(),
                reason: "id must not be empty".to_string(),
            });
        }
        self.condition.validate()?;

        let mut previous: Option<&EscalationStep> = None;
        for step in &self.escalation {
            if step.severity < self.severity {
                return Err(ConfigurationError::InvalidEscalation {
                    rule: self.id.clone(),
                    reason: format!(
                        "step at {}s lowers severity below the base {}",
                        step.after_seconds, self.severity
                    ),
                });
            }
            if let Some(prev) = previous {
                if step.after_seconds <= prev.after_seconds {
                    return Err(ConfigurationError::InvalidEscalation {
                        rule: self.id.clone(),
                        reason: "steps must be in strictly ascending time order".to_string(),
                    });
                }
                if step.severity < prev.severity {
                    return Err(ConfigurationError::InvalidEscalation {
                        rule: self.id.clone(),
                        reason: format!(
                            "severity drops from {} to {} at {}s",
                            prev.severity, step.severity, step.after_seconds
                        ),
                    });
                }
            }
            previous = Some(step);
        }
        Ok(())
    }

    /// Severity reached after being active for `elapsed`. Never below the base.
    pub fn severity_after(&self, elapsed: Duration) -> Severity {
        let elapsed = elapsed.num_seconds().max(0) as u64;
        self.escalation
            .iter()
            .filter(|step| elapsed >= step.after_seconds)
            .map(|step| step.severity)
            .fold(self.severity, Severity::max)
    }

    /// SHA-256 over the rule id and its fingerprint fields, hex encoded.
    pub fn fingerprint(&self, metrics: &MetricsSnapshot) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        for field in &self.fingerprint_fields {
            let rendered = match metrics.get(field) {
                Some(v) => match sentinel::sentinel_str(v) {
                    Some(text) => text.to_string(),
                    None => format!("{v:.6}"),
                },
                None => "missing".to_string(),
            };
            hasher.update(b"|");
            hasher.update(field.as_bytes());
            hasher.update(b"=");
            hasher.update(rendered.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Values of the metrics this rule reads, as present in `metrics`.
    pub fn context(&self, metrics: &MetricsSnapshot) -> BTreeMap<String, f64> {
        self.condition
            .referenced_metrics()
            .into_iter()
            .chain(self.fingerprint_fields.iter().map(String::as_str))
            .filter_map(|key| metrics.get(key).map(|v| (key.to_string(), v)))
            .collect()
    }
}

/// A validated collection of rules with unique ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<AlertRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<AlertRule>) -> Result<Self, ConfigurationError> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigurationError::DuplicateRuleId(rule.id.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// Parse a JSON array of rules.
    pub fn from_json(text: &str) -> Result<Self, ConfigurationError> {
        let rules: Vec<AlertRule> =
            serde_json::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::new(rules)
    }

    /// Fail on the first rule reading a metric `schema` does not contain.
    pub fn validate_against(&self, schema: &MetricsSchema) -> Result<(), ConfigurationError> {
        for rule in &self.rules {
            for metric in rule.condition.referenced_metrics() {
                if !schema.contains(metric) {
                    return Err(ConfigurationError::UnknownMetric {
                        rule: rule.id.clone(),
                        metric: metric.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A fired rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub rule_id: String,
    pub fired_at: DateTime<Utc>,
    pub severity: Severity,
    /// Metric values the rule saw when it fired or last escalated.
    #[serde(with = "sentinel::map")]
    pub context: BTreeMap<String, f64>,
    pub fingerprint: String,
    /// True when this alert is reported because its severity was raised.
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ComparisonOperator;

    fn rule() -> AlertRule {
        AlertRule::new(
            "weak-ic",
            AlertCondition::simple("ic.pearson", ComparisonOperator::Lt, 0.05),
            Severity::Warning,
        )
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Critical < Severity::Emergency);
    }

    #[test]
    fn test_escalation_validation() {
        let ok = rule().with_escalation(vec![
            EscalationStep { after_seconds: 600, severity: Severity::Critical },
            EscalationStep { after_seconds: 3600, severity: Severity::Emergency },
        ]);
        assert!(ok.validate().is_ok());

        let unordered = rule().with_escalation(vec![
            EscalationStep { after_seconds: 600, severity: Severity::Critical },
            EscalationStep { after_seconds: 600, severity: Severity::Emergency },
        ]);
        assert!(matches!(
            unordered.validate(),
            Err(ConfigurationError::InvalidEscalation { .. })
        ));

        let downgrade = rule().with_escalation(vec![EscalationStep {
            after_seconds: 60,
            severity: Severity::Info,
        }]);
        assert!(downgrade.validate().is_err());
    }

    #[test]
    fn test_severity_after() {
        let r = rule().with_escalation(vec![
            EscalationStep { after_seconds: 600, severity: Severity::Critical },
            EscalationStep { after_seconds: 3600, severity: Severity::Emergency },
        ]);
        assert_eq!(r.severity_after(Duration::seconds(0)), Severity::Warning);
        assert_eq!(r.severity_after(Duration::seconds(600)), Severity::Critical);
        assert_eq!(r.severity_after(Duration::hours(5)), Severity::Emergency);
    }

    #[test]
    fn test_fingerprint_depends_on_fields() {
        let r = rule().with_fingerprint_fields(vec!["drift.max_severity".to_string()]);
        let a = MetricsSnapshot::new().with("drift.max_severity", 1.0).with("ic.pearson", 0.01);
        let b = MetricsSnapshot::new().with("drift.max_severity", 1.0).with("ic.pearson", 0.02);
        let c = MetricsSnapshot::new().with("drift.max_severity", 2.0).with("ic.pearson", 0.01);

        assert_eq!(r.fingerprint(&a), r.fingerprint(&b));
        assert_ne!(r.fingerprint(&a), r.fingerprint(&c));
        assert_eq!(r.fingerprint(&a).len(), 64);
        assert_ne!(rule().fingerprint(&a), r.fingerprint(&a));
    }

    #[test]
    fn test_rule_set_rejects_duplicates() {
        let err = RuleSet::new(vec![rule(), rule()]).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateRuleId("weak-ic".to_string()));
    }

    #[test]
    fn test_rule_set_from_json() {
        let rules = RuleSet::from_json(
            r#"[{
                "id": "weak-ic-under-drift",
                "severity": "warning",
                "cooldown_seconds": 3600,
                "escalation": [{"after_seconds": 7200, "severity": "critical"}],
                "condition": {"operator": "AND", "conditions": [
                    {"metric": "ic.pearson", "operator": "lt", "threshold": 0.05},
                    {"metric": "drift.detected", "operator": "eq", "threshold": 1}
                ]}
            }]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].cooldown(), Duration::hours(1));

        let err = RuleSet::from_json(
            r#"[{"id": "bad", "severity": "info",
                 "condition": {"operator": "AND", "conditions": [
                    {"metric": "ic.pearson", "operator": "lt", "threshold": 0.05}]}}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(ref msg) if msg.contains("AND requires")));
    }

    #[test]
    fn test_schema_validation() {
        let rules = RuleSet::new(vec![rule()]).unwrap();
        let known = MetricsSchema::from_keys(["ic.pearson", "risk.sharpe_ratio"]);
        assert!(rules.validate_against(&known).is_ok());

        let unknown = MetricsSchema::from_keys(["risk.sharpe_ratio"]);
        assert_eq!(
            rules.validate_against(&unknown).unwrap_err(),
            ConfigurationError::UnknownMetric {
                rule: "weak-ic".to_string(),
                metric: "ic.pearson".to_string()
            }
        );
    }
}
