use chrono::{DateTime, Utc};
use eval_core::MetricsSnapshot;
use tracing::{debug, info, warn};

use crate::error::AlertError;
use crate::rule::{Alert, AlertRule, RuleSet};
use crate::state::{ActiveAlert, AlertState};

/// A rule that could not be evaluated this sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: AlertError,
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertSweep {
    /// Newly fired and newly escalated alerts.
    pub fired: Vec<Alert>,
    pub failures: Vec<RuleFailure>,
}

impl AlertSweep {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluates a rule set and owns the active-alert state of one pipeline.
pub struct AlertConditionEngine {
    rules: RuleSet,
    state: AlertState,
}

impl AlertConditionEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            state: AlertState::new(),
        }
    }

    /// Resume from persisted state. Entries of rules no longer configured
    /// are dropped.
    pub fn with_state(rules: RuleSet, mut state: AlertState) -> Self {
        let dropped = state.retain_rules(|id| rules.get(id).is_some());
        if dropped > 0 {
            debug!(dropped, "Dropped active alerts of removed rules");
        }
        Self { rules, state }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn into_state(self) -> AlertState {
        self.state
    }

    pub fn evaluate_all(&mut self, metrics: &MetricsSnapshot) -> AlertSweep {
        self.evaluate_all_at(metrics, Utc::now())
    }

    /// Evaluate every rule against `metrics` as of `now`.
    ///
    /// Work happens on a copy of the state that replaces the engine's state
    /// only once every rule has been visited. A rule whose condition cannot
    /// be evaluated is reported in `failures` and its active alerts are left
    /// untouched.
    pub fn evaluate_all_at(&mut self, metrics: &MetricsSnapshot, now: DateTime<Utc>) -> AlertSweep {
        let mut next = self.state.clone();
        let mut sweep = AlertSweep::default();

        for rule in self.rules.rules() {
            match rule.condition.evaluate(metrics) {
                Err(error) => {
                    warn!(rule = %rule.id, error = %error, "Skipping rule this cycle");
                    sweep.failures.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        error,
                    });
                }
                Ok(false) => {
                    let purged = next.expire_rule(&rule.id, None, rule.cooldown(), now);
                    if purged > 0 {
                        debug!(rule = %rule.id, purged, "Cooldown elapsed, alert cleared");
                    }
                }
                Ok(true) => {
                    let fingerprint = rule.fingerprint(metrics);
                    if let Some(alert) = trigger(&mut next, rule, &fingerprint, metrics, now) {
                        sweep.fired.push(alert);
                    }
                    next.expire_rule(&rule.id, Some(&fingerprint), rule.cooldown(), now);
                }
            }
        }

        self.state = next;
        if !sweep.fired.is_empty() || !sweep.failures.is_empty() {
            info!(
                fired = sweep.fired.len(),
                failed_rules = sweep.failures.len(),
                active = self.state.len(),
                "Alert sweep complete"
            );
        }
        sweep
    }
}

/// Record a firing rule. Returns the alert if it is new or was escalated.
fn trigger(
    state: &mut AlertState,
    rule: &AlertRule,
    fingerprint: &str,
    metrics: &MetricsSnapshot,
    now: DateTime<Utc>,
) -> Option<Alert> {
    if let Some(active) = state.get_mut(fingerprint) {
        active.last_triggered_at = now;
        let target = rule.severity_after(now - active.first_fired_at);
        if target > active.alert.severity {
            info!(
                rule = %rule.id,
                from = %active.alert.severity,
                to = %target,
                "Alert escalated"
            );
            active.alert.severity = target;
            active.alert.escalated = true;
            active.alert.context = rule.context(metrics);
            return Some(active.alert.clone());
        }
        return None;
    }

    let alert = Alert {
        rule_id: rule.id.clone(),
        fired_at: now,
        severity: rule.severity_after(chrono::Duration::zero()),
        context: rule.context(metrics),
        fingerprint: fingerprint.to_string(),
        escalated: false,
        description: rule.description.clone(),
    };
    state.insert(ActiveAlert {
        alert: alert.clone(),
        first_fired_at: now,
        last_triggered_at: now,
    });
    Some(alert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AlertCondition, ComparisonOperator};
    use crate::rule::{EscalationStep, Severity};
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn weak_ic_rule() -> AlertRule {
        AlertRule::new(
            "weak-ic",
            AlertCondition::simple("ic.pearson", ComparisonOperator::Lt, 0.05),
            Severity::Warning,
        )
        .with_cooldown(30 * 60)
    }

    fn engine(rules: Vec<AlertRule>) -> AlertConditionEngine {
        AlertConditionEngine::new(RuleSet::new(rules).unwrap())
    }

    fn ic(value: f64) -> MetricsSnapshot {
        MetricsSnapshot::new().with("ic.pearson", value)
    }

    #[test]
    fn test_suppression_idempotence() {
        let mut engine = engine(vec![weak_ic_rule()]);
        let first = engine.evaluate_all_at(&ic(0.01), t(0));
        let second = engine.evaluate_all_at(&ic(0.01), t(5));

        assert_eq!(first.fired.len(), 1);
        assert!(second.fired.is_empty());
        assert_eq!(engine.state().len(), 1);
        assert_eq!(first.fired[0].context["ic.pearson"], 0.01);
    }

    #[test]
    fn test_escalation_is_monotonic() {
        let rule = weak_ic_rule().with_escalation(vec![
            EscalationStep {
                after_seconds: 10 * 60,
                severity: Severity::Critical,
            },
            EscalationStep {
                after_seconds: 60 * 60,
                severity: Severity::Emergency,
            },
        ]);
        let mut engine = engine(vec![rule]);

        assert_eq!(engine.evaluate_all_at(&ic(0.01), t(0)).fired[0].severity, Severity::Warning);

        let escalated = engine.evaluate_all_at(&ic(0.01), t(15));
        assert_eq!(escalated.fired.len(), 1);
        assert_eq!(escalated.fired[0].severity, Severity::Critical);
        assert!(escalated.fired[0].escalated);

        // Same condition again: not re-reported, not downgraded
        let again = engine.evaluate_all_at(&ic(0.01), t(20));
        assert!(again.fired.is_empty());
        let active = engine.state().active_alerts().next().unwrap();
        assert_eq!(active.alert.severity, Severity::Critical);
        assert_eq!(active.first_fired_at, t(0));

        let top = engine.evaluate_all_at(&ic(0.01), t(61));
        assert_eq!(top.fired[0].severity, Severity::Emergency);
    }

    #[test]
    fn test_cooldown_suppresses_flapping_then_purges() {
        let mut engine = engine(vec![weak_ic_rule()]);
        assert_eq!(engine.evaluate_all_at(&ic(0.01), t(0)).fired.len(), 1);

        // Resolved, then firing again inside the cooldown: suppressed
        assert!(engine.evaluate_all_at(&ic(0.2), t(10)).fired.is_empty());
        assert_eq!(engine.state().len(), 1);
        assert!(engine.evaluate_all_at(&ic(0.01), t(20)).fired.is_empty());

        // Quiet for a full cooldown after the last trigger: purged
        assert!(engine.evaluate_all_at(&ic(0.2), t(45)).fired.is_empty());
        assert_eq!(engine.state().len(), 1);
        engine.evaluate_all_at(&ic(0.2), t(50));
        assert!(engine.state().is_empty());

        // Fires fresh afterwards
        let refire = engine.evaluate_all_at(&ic(0.01), t(55));
        assert_eq!(refire.fired.len(), 1);
        assert_eq!(refire.fired[0].fired_at, t(55));
    }

    #[test]
    fn test_missing_metric_does_not_abort_sweep() {
        let sortino = AlertRule::new(
            "negative-sortino",
            AlertCondition::simple("risk.sortino_ratio", ComparisonOperator::Lt, 0.0),
            Severity::Critical,
        );
        let mut engine = engine(vec![sortino, weak_ic_rule()]);
        let sweep = engine.evaluate_all_at(&ic(0.01), t(0));

        assert_eq!(sweep.fired.len(), 1);
        assert_eq!(sweep.fired[0].rule_id, "weak-ic");
        assert_eq!(sweep.failures.len(), 1);
        assert_eq!(sweep.failures[0].rule_id, "negative-sortino");
        assert!(!sweep.is_clean());
    }

    #[test]
    fn test_distinct_fingerprints_fire_separately() {
        let rule = AlertRule::new(
            "drift",
            AlertCondition::simple("drift.detected", ComparisonOperator::Eq, 1.0),
            Severity::Warning,
        )
        .with_cooldown(3600)
        .with_fingerprint_fields(vec!["drift.max_severity".to_string()]);
        let mut engine = engine(vec![rule]);

        let moderate = MetricsSnapshot::new()
            .with("drift.detected", 1.0)
            .with("drift.max_severity", 1.0);
        let significant = MetricsSnapshot::new()
            .with("drift.detected", 1.0)
            .with("drift.max_severity", 2.0);

        assert_eq!(engine.evaluate_all_at(&moderate, t(0)).fired.len(), 1);
        assert_eq!(engine.evaluate_all_at(&significant, t(1)).fired.len(), 1);
        assert_eq!(engine.state().len(), 2);
    }

    #[test]
    fn test_with_state_drops_removed_rules() {
        let mut first = engine(vec![weak_ic_rule()]);
        first.evaluate_all_at(&ic(0.01), t(0));
        let state = first.into_state();

        let other = AlertRule::new(
            "other",
            AlertCondition::simple("risk.sharpe_ratio", ComparisonOperator::Lt, 0.0),
            Severity::Info,
        );
        let resumed = AlertConditionEngine::with_state(RuleSet::new(vec![other]).unwrap(), state.clone());
        assert!(resumed.state().is_empty());

        let same = AlertConditionEngine::with_state(RuleSet::new(vec![weak_ic_rule()]).unwrap(), state);
        assert_eq!(same.state().len(), 1);
    }

    #[test]
    fn test_state_survives_serialization() {
        let mut engine = engine(vec![weak_ic_rule()]);
        engine.evaluate_all_at(&ic(0.01), t(0));
        let json = serde_json::to_string(engine.state()).unwrap();
        let restored: AlertState = serde_json::from_str(&json).unwrap();

        let mut resumed = AlertConditionEngine::with_state(RuleSet::new(vec![weak_ic_rule()]).unwrap(), restored);
        assert!(resumed.evaluate_all_at(&ic(0.01), t(5)).fired.is_empty());
    }
}
