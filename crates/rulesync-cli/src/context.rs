//! Resolved configuration plus the services built from it

use rulesync_core::{DeployConfig, Orchestrator, SourceConfig};
use rulesync_ledger::AuditLedger;

use crate::cli::Cli;
use crate::error::Result;

pub struct Context {
    pub config: DeployConfig,
}

impl Context {
    /// Load the config file and apply command-line overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = DeployConfig::load(&cli.config)?;
        if let Some(node_id) = &cli.node_id {
            config.node_id = node_id.clone();
        }
        if let Some(key) = &cli.api_key
            && let SourceConfig::Package { api_key, .. } = &mut config.source
        {
            *api_key = key.clone();
        }
        Ok(Self { config })
    }

    pub fn ledger(&self) -> Result<AuditLedger> {
        Ok(AuditLedger::open(&self.config.ledger_path)?)
    }

    /// Orchestrator wired to the configured transport, service, ledger
    /// and (for package sources) the authority reporter.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        self.config.validate()?;
        let transport = self.config.transport()?;
        let control = Box::new(self.config.process_control());

        let mut orchestrator =
            Orchestrator::new(self.config.clone(), transport, control)?.with_ledger(self.ledger()?);
        if self.config.report
            && let Some(client) = self.config.authority_client()
        {
            orchestrator = orchestrator.with_reporter(client);
        }
        Ok(orchestrator)
    }
}
