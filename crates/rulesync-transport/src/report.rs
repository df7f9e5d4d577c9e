//! Deployment report sent to the authority after each attempt

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of `POST /deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub rules_count: u32,
    pub decoders_count: u32,
    pub success: bool,
    #[serde(default)]
    pub error: String,
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget sink for deployment reports.
pub trait DeploymentReporter {
    fn report(&self, report: &DeploymentReport) -> Result<()>;
}
