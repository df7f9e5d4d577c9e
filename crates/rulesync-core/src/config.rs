//! Deployment configuration

use crate::activation::SystemdControl;
use crate::{Error, Result};
use rulesync_fs::{ConfigStore, FilePattern};
use rulesync_transport::{
    AuthorityClient, BundleTransport, Category, PackageFormat, PackageTransport,
    RepositoryTransport,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a node needs to run a deployment.
///
/// Every field has a default, so a partial file (or none at all) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub node_id: String,
    pub rules_dir: PathBuf,
    pub decoders_dir: PathBuf,
    pub backup_root: PathBuf,
    pub lock_path: PathBuf,
    /// Glob selecting managed files inside each live directory
    pub file_pattern: String,
    pub create_backup: bool,
    pub auto_restart: bool,
    /// Service unit restarted after a swap
    pub service: String,
    /// Program invoked as `<systemctl> restart <service>`
    pub systemctl: PathBuf,
    pub restart_timeout_secs: u64,
    pub verify_timeout_secs: u64,
    pub verify_interval_ms: u64,
    pub ledger_path: PathBuf,
    /// Post a report to the authority after each attempt
    pub report: bool,
    pub source: SourceConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            node_id: "unknown-server".into(),
            rules_dir: PathBuf::from("/var/ossec/etc/rules"),
            decoders_dir: PathBuf::from("/var/ossec/etc/decoders"),
            backup_root: PathBuf::from("/backup"),
            lock_path: PathBuf::from("/var/lock/rulesync.lock"),
            file_pattern: "*.xml".into(),
            create_backup: true,
            auto_restart: true,
            service: "wazuh-manager".into(),
            systemctl: PathBuf::from("systemctl"),
            restart_timeout_secs: 30,
            verify_timeout_secs: 30,
            verify_interval_ms: 1000,
            ledger_path: PathBuf::from("/var/lib/rulesync/ledger.sqlite3"),
            report: true,
            source: SourceConfig::default(),
        }
    }
}

/// Where bundles come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Git repository checked out on the node
    Repository {
        #[serde(default)]
        url: String,
        #[serde(default = "default_branch")]
        branch: String,
        #[serde(default = "default_checkout_path")]
        checkout_path: PathBuf,
    },
    /// Archive downloaded from the authority API
    Package {
        #[serde(default = "default_api_url")]
        api_url: String,
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        format: PackageFormat,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Repository {
            url: String::new(),
            branch: default_branch(),
            checkout_path: default_checkout_path(),
        }
    }
}

fn default_branch() -> String {
    "main".into()
}

fn default_checkout_path() -> PathBuf {
    PathBuf::from("/opt/wazuh-rules")
}

fn default_api_url() -> String {
    "http://localhost:8000".into()
}

impl DeployConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load_or_default(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ConfigStore::new().save(path, self)?;
        Ok(())
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(Error::config("node_id must not be empty"));
        }
        if self.rules_dir == self.decoders_dir {
            return Err(Error::config("rules_dir and decoders_dir must differ"));
        }
        self.pattern()?;
        match &self.source {
            SourceConfig::Repository { url, branch, .. } => {
                if url.is_empty() {
                    return Err(Error::config("source.url is required for a repository source"));
                }
                if branch.is_empty() {
                    return Err(Error::config("source.branch must not be empty"));
                }
            }
            SourceConfig::Package { api_url, api_key, .. } => {
                if api_url.is_empty() {
                    return Err(Error::config("source.api_url is required for a package source"));
                }
                if api_key.is_empty() {
                    return Err(Error::config("source.api_key is required for a package source"));
                }
            }
        }
        Ok(())
    }

    pub fn pattern(&self) -> Result<FilePattern> {
        Ok(FilePattern::new(&self.file_pattern)?)
    }

    /// Live directory for a category.
    pub fn category_dir(&self, category: Category) -> &Path {
        match category {
            Category::Rules => &self.rules_dir,
            Category::Decoders => &self.decoders_dir,
        }
    }

    /// `systemctl` control of the configured service.
    pub fn process_control(&self) -> SystemdControl {
        SystemdControl::new(&self.service, self.restart_timeout()).with_program(&self.systemctl)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_millis(self.verify_interval_ms.max(1))
    }

    /// Authority client for a package source, `None` for a repository.
    pub fn authority_client(&self) -> Option<AuthorityClient> {
        match &self.source {
            SourceConfig::Package {
                api_url, api_key, ..
            } => Some(AuthorityClient::new(api_url, api_key, &self.node_id)),
            SourceConfig::Repository { .. } => None,
        }
    }

    /// Build the transport selected by `source`.
    pub fn transport(&self) -> Result<Box<dyn BundleTransport>> {
        let pattern = self.pattern()?;
        let transport: Box<dyn BundleTransport> = match &self.source {
            SourceConfig::Repository {
                url,
                branch,
                checkout_path,
            } => Box::new(RepositoryTransport::new(
                url,
                branch,
                checkout_path,
                pattern,
            )),
            SourceConfig::Package { format, .. } => {
                let client = self
                    .authority_client()
                    .ok_or_else(|| Error::config("package source without authority"))?;
                Box::new(PackageTransport::new(client, *format, pattern))
            }
        };
        Ok(transport)
    }
}
