//! Drift Monitor
//!
//! Freezes reference distributions for a monitored model and flags when
//! production features or predictions move away from them.

pub mod baseline;
pub mod error;
pub mod monitor;
pub mod report;
pub mod store;

pub use baseline::{Baseline, ProductionBatch};
pub use error::DriftError;
pub use monitor::{DriftMonitor, DriftThresholds, MonitorState};
pub use report::{DriftReport, DriftSeverity, DriftTestKind, DriftTestResult};
pub use store::{BaselineStore, SqliteBaselineStore};
