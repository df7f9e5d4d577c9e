//! Audit ledger for rulesync
//!
//! Append-only record of every deployment attempt plus per-node
//! registration and health, stored in SQLite. Aggregates are computed
//! from the deployment log alone.

pub mod error;
pub mod ledger;
pub mod record;
pub mod stats;

pub use error::{Error, Result};
pub use ledger::{AuditLedger, DeploymentSink};
pub use record::{DeploymentAction, DeploymentRecord, FilesApplied, NodeRecord, Outcome};
pub use stats::{DailyStats, DeploymentStats, NodeStats};
