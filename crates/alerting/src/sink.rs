use async_trait::async_trait;
use eval_core::sentinel;
use tracing::{debug, error, info, warn};

use crate::rule::{Alert, Severity};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("delivery via {sink} failed: {reason}")]
    Delivery { sink: String, reason: String },
}

/// Destination for fired alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError>;
    fn name(&self) -> &str;
}

/// Writes alerts to the tracing subscriber at a level matching severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        let context: serde_json::Map<String, serde_json::Value> = alert
            .context
            .iter()
            .map(|(k, v)| (k.clone(), sentinel::to_json(*v)))
            .collect();
        let context = serde_json::Value::Object(context).to_string();
        let description = alert.description.as_deref().unwrap_or("");
        match alert.severity {
            Severity::Info => info!(
                rule = %alert.rule_id,
                severity = %alert.severity,
                escalated = alert.escalated,
                fingerprint = %alert.fingerprint,
                %context,
                "{description}"
            ),
            Severity::Warning => warn!(
                rule = %alert.rule_id,
                severity = %alert.severity,
                escalated = alert.escalated,
                fingerprint = %alert.fingerprint,
                %context,
                "{description}"
            ),
            Severity::Critical | Severity::Emergency => error!(
                rule = %alert.rule_id,
                severity = %alert.severity,
                escalated = alert.escalated,
                fingerprint = %alert.fingerprint,
                %context,
                "{description}"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fans alerts out to every configured sink.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver to all sinks. A failing sink is logged and does not stop
    /// the others. Returns the number of successful deliveries.
    pub async fn dispatch(&self, alerts: &[Alert]) -> usize {
        let mut delivered = 0;
        for alert in alerts {
            for sink in &self.sinks {
                match sink.deliver(alert).await {
                    Ok(()) => {
                        delivered += 1;
                        debug!(sink = sink.name(), rule = %alert.rule_id, "Alert delivered");
                    }
                    Err(e) => warn!(sink = sink.name(), rule = %alert.rule_id, "Delivery failed: {}", e),
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl AlertSink for Recording {
        async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(alert.rule_id.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Broken;

    #[async_trait]
    impl AlertSink for Broken {
        async fn deliver(&self, _alert: &Alert) -> Result<(), SinkError> {
            Err(SinkError::Delivery {
                sink: "broken".to_string(),
                reason: "unreachable".to_string(),
            })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn alert(rule_id: &str, severity: Severity) -> Alert {
        Alert {
            rule_id: rule_id.to_string(),
            fired_at: Utc::now(),
            severity,
            context: BTreeMap::from([("ic.pearson".to_string(), f64::NAN)]),
            fingerprint: "abc".to_string(),
            escalated: false,
            description: Some("IC collapsed".to_string()),
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::new()
            .with_sink(Broken)
            .with_sink(Recording(seen.clone()))
            .with_sink(LogSink);

        let delivered = dispatcher
            .dispatch(&[alert("a", Severity::Warning), alert("b", Severity::Emergency)])
            .await;

        assert_eq!(delivered, 4);
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_dispatcher() {
        let dispatcher = AlertDispatcher::new();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dispatch(&[alert("a", Severity::Info)]).await, 0);
    }
}
