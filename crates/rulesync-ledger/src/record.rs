//! Deployment and node records

use crate::error::UnknownVariant;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

const UNFINISHED_DETAIL: &str = "deployment did not finish";

/// Final classification of a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
    RolledBack,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failed => "FAILED",
            Outcome::RolledBack => "ROLLED_BACK",
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

impl FromStr for Outcome {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Outcome::Success),
            "FAILED" => Ok(Outcome::Failed),
            "ROLLED_BACK" => Ok(Outcome::RolledBack),
            other => Err(UnknownVariant {
                kind: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run did to the live directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentAction {
    /// Live state was (or was meant to be) replaced
    #[default]
    Deploy,
    /// Live state already matched the bundle
    Noop,
}

impl DeploymentAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentAction::Deploy => "deploy",
            DeploymentAction::Noop => "noop",
        }
    }
}

impl FromStr for DeploymentAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(DeploymentAction::Deploy),
            "noop" => Ok(DeploymentAction::Noop),
            other => Err(UnknownVariant {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

/// Files written per category (added plus replaced).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesApplied {
    pub rules: u32,
    pub decoders: u32,
}

impl FilesApplied {
    pub fn total(&self) -> u32 {
        self.rules + self.decoders
    }
}

/// One deployment attempt.
///
/// Created when a run starts with a pessimistic `FAILED` outcome and
/// finalized once. The ledger only accepts finalized records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub node_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub action: DeploymentAction,
    pub files_applied: FilesApplied,
    pub outcome: Outcome,
    pub error_detail: Option<String>,
    /// Live state was replaced without a snapshot to roll back to
    pub backup_skipped: bool,
    pub backup_path: Option<String>,
    pub generation: Option<String>,
}

impl DeploymentRecord {
    pub fn start(node_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.into(),
            started_at: now(),
            finished_at: None,
            action: DeploymentAction::Deploy,
            files_applied: FilesApplied::default(),
            outcome: Outcome::Failed,
            error_detail: Some(UNFINISHED_DETAIL.to_string()),
            backup_skipped: false,
            backup_path: None,
            generation: None,
        }
    }

    /// Finalize with `outcome`. Success clears any error detail.
    pub fn finish(&mut self, outcome: Outcome, error_detail: Option<String>) {
        self.finish_at(outcome, error_detail, now());
    }

    pub fn finish_at(&mut self, outcome: Outcome, error_detail: Option<String>, at: DateTime<Utc>) {
        self.outcome = outcome;
        self.error_detail = if outcome.is_success() {
            None
        } else {
            error_detail.or_else(|| Some(UNFINISHED_DETAIL.to_string()))
        };
        self.finished_at = Some(at.max(self.started_at));
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Registration and health of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    pub description: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub deployment_count: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Current time at the precision the ledger stores.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
