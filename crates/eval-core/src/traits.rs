use crate::{MetricsSchema, MetricsSnapshot};

/// A computed result that can be flattened into a [`MetricsSnapshot`] so
/// alert rules can reference its fields by dotted key.
pub trait MetricProjection {
    fn project_into(&self, snapshot: &mut MetricsSnapshot);

    fn project(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::new();
        self.project_into(&mut snapshot);
        snapshot
    }

    /// Keys produced by [`MetricProjection::project_into`].
    fn metric_schema(&self) -> MetricsSchema {
        self.project().schema()
    }
}
