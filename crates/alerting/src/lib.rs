//! Threshold alerting over evaluation and drift metrics.
//!
//! Rules are boolean trees of metric comparisons. The engine evaluates them
//! against a flat [`eval_core::MetricsSnapshot`], suppresses repeats by
//! fingerprint, escalates long-running alerts and lets resolved ones expire
//! after a cooldown. Active alerts can be persisted between runs through an
//! [`AlertStateStore`].

pub mod condition;
pub mod engine;
pub mod error;
pub mod rule;
pub mod sink;
pub mod state;
pub mod store;

pub use condition::{AlertCondition, ComparisonOperator, LogicalOperator};
pub use engine::{AlertConditionEngine, AlertSweep, RuleFailure};
pub use error::{AlertError, ConfigurationError, StoreError};
pub use rule::{Alert, AlertRule, EscalationStep, RuleSet, Severity};
pub use sink::{AlertDispatcher, AlertSink, LogSink, SinkError};
pub use state::{ActiveAlert, AlertState};
pub use store::{AlertStateStore, SqliteAlertStateStore};
