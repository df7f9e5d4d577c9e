//! Core sync and deployment engine for rulesync
//!
//! - [`plan`]: compares live files with a bundle manifest
//! - [`backup`]: snapshots of the live directories taken before a swap
//! - [`activation`]: restarting the consuming service and waiting for it
//! - [`orchestrator`]: the deployment state machine tying it together

pub mod activation;
pub mod backup;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod plan;

pub use activation::{ActivationError, ProcessControl, SystemdControl, wait_until_active};
pub use backup::{BackupManager, BackupSnapshot, SnapshotMetadata};
pub use config::{DeployConfig, SourceConfig};
pub use error::{Error, Result};
pub use orchestrator::{DeployState, Orchestrator, RunOptions, RunReport};
pub use plan::{BundlePlan, SyncPlan, plan};
