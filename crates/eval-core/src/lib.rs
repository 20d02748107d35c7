//! Shared building blocks for the evaluation and drift-monitoring crates:
//! the error taxonomy, the scored-snapshot data model, flat metric snapshots,
//! NaN/Infinity-preserving serde helpers and the statistical primitives.

pub mod error;
pub mod sentinel;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
