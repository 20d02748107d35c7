use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::Alert;

/// An alert that is firing or still inside its cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub alert: Alert,
    pub first_fired_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
}

impl ActiveAlert {
    pub fn is_expired(&self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_triggered_at >= cooldown
    }
}

/// Active alerts of one pipeline, keyed by fingerprint.
///
/// The only state carried between runs. Persist it after a complete sweep
/// and hand it back to the next engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    active: BTreeMap<String, ActiveAlert>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&ActiveAlert> {
        self.active.get(fingerprint)
    }

    pub(crate) fn get_mut(&mut self, fingerprint: &str) -> Option<&mut ActiveAlert> {
        self.active.get_mut(fingerprint)
    }

    pub(crate) fn insert(&mut self, active: ActiveAlert) {
        self.active.insert(active.alert.fingerprint.clone(), active);
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_alerts(&self) -> impl Iterator<Item = &ActiveAlert> {
        self.active.values()
    }

    pub fn active_for_rule<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a ActiveAlert> + 'a {
        self.active.values().filter(move |a| a.alert.rule_id == rule_id)
    }

    /// Drop entries of `rule_id` past their cooldown, except `keep`.
    /// Returns how many were removed.
    pub(crate) fn expire_rule(
        &mut self,
        rule_id: &str,
        keep: Option<&str>,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let before = self.active.len();
        self.active.retain(|fingerprint, active| {
            active.alert.rule_id != rule_id
                || keep == Some(fingerprint.as_str())
                || !active.is_expired(cooldown, now)
        });
        before - self.active.len()
    }

    /// Keep only entries whose rule satisfies `known`.
    pub(crate) fn retain_rules<F>(&mut self, known: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.active.len();
        self.active.retain(|_, active| known(&active.alert.rule_id));
        before - self.active.len()
    }
}
