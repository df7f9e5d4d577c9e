//! Deployment orchestrator
//!
//! Sequences one deployment as a state machine:
//!
//! ```text
//! IDLE -> BACKING_UP -> FETCHING -> PLANNING -> NOOP -> COMMITTED
//!                                            -> STAGING -> SWAPPING -> ACTIVATING -> VERIFYING -> COMMITTED
//! SWAPPING | ACTIVATING | VERIFYING -> ROLLING_BACK -> ROLLED_BACK
//! any failure before SWAPPING, or a failed rollback -> FAILED
//! ```
//!
//! Rules and decoders are planned, staged and swapped independently but
//! commit or roll back together. Only the lock and invalid configuration
//! make [`Orchestrator::run`] return an error; every other failure is a
//! classified outcome on the returned [`RunReport`].

use crate::activation::{ProcessControl, wait_until_active};
use crate::backup::{BackupManager, BackupSnapshot};
use crate::config::DeployConfig;
use crate::plan::{BundlePlan, SyncPlan, plan};
use crate::{Error, Result};
use rulesync_fs::{
    DirectoryOps, FileDescriptor, FilePattern, LockGuard, NativeDirectoryOps, io, scan_directory,
};
use rulesync_ledger::{DeploymentAction, DeploymentRecord, DeploymentSink, Outcome};
use rulesync_transport::{
    BundleTransport, BundleTree, Category, DeploymentReport, DeploymentReporter,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Attempts at scanning a live directory whose files change underneath.
const SCAN_ATTEMPTS: usize = 3;

/// States of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployState {
    Idle,
    BackingUp,
    Fetching,
    Planning,
    Noop,
    Staging,
    Swapping,
    Activating,
    Verifying,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
}

impl DeployState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployState::Idle => "IDLE",
            DeployState::BackingUp => "BACKING_UP",
            DeployState::Fetching => "FETCHING",
            DeployState::Planning => "PLANNING",
            DeployState::Noop => "NOOP",
            DeployState::Staging => "STAGING",
            DeployState::Swapping => "SWAPPING",
            DeployState::Activating => "ACTIVATING",
            DeployState::Verifying => "VERIFYING",
            DeployState::Committed => "COMMITTED",
            DeployState::RollingBack => "ROLLING_BACK",
            DeployState::RolledBack => "ROLLED_BACK",
            DeployState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeployState::Committed | DeployState::RolledBack | DeployState::Failed
        )
    }
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Continue without a snapshot when the backup step fails
    pub force: bool,
    /// Fetch and plan only
    pub dry_run: bool,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub record: DeploymentRecord,
    /// Every state visited, starting with `IDLE`
    pub transitions: Vec<DeployState>,
    pub plan: Option<BundlePlan>,
    pub backup: Option<PathBuf>,
    pub dry_run: bool,
    pub ledger_error: Option<String>,
    pub report_error: Option<String>,
}

impl RunReport {
    pub fn final_state(&self) -> DeployState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(DeployState::Idle)
    }

    pub fn outcome(&self) -> Outcome {
        self.record.outcome
    }
}

/// Runs deployments for one node.
pub struct Orchestrator {
    config: DeployConfig,
    pattern: FilePattern,
    transport: Box<dyn BundleTransport>,
    control: Box<dyn ProcessControl>,
    ops: Box<dyn DirectoryOps>,
    ledger: Option<Box<dyn DeploymentSink>>,
    reporter: Option<Box<dyn DeploymentReporter>>,
}

impl Orchestrator {
    pub fn new(
        config: DeployConfig,
        transport: Box<dyn BundleTransport>,
        control: Box<dyn ProcessControl>,
    ) -> Result<Self> {
        let pattern = config.pattern()?;
        if config.rules_dir == config.decoders_dir {
            return Err(Error::config("rules_dir and decoders_dir must differ"));
        }
        Ok(Self {
            config,
            pattern,
            transport,
            control,
            ops: Box::new(NativeDirectoryOps),
            ledger: None,
            reporter: None,
        })
    }

    pub fn with_ledger(mut self, ledger: impl DeploymentSink + 'static) -> Self {
        self.ledger = Some(Box::new(ledger));
        self
    }

    pub fn with_reporter(mut self, reporter: impl DeploymentReporter + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn with_directory_ops(mut self, ops: impl DirectoryOps + 'static) -> Self {
        self.ops = Box::new(ops);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Run one deployment under the node lock.
    pub fn run(&self, options: RunOptions) -> Result<RunReport> {
        let _lock = match LockGuard::try_acquire(&self.config.lock_path) {
            Ok(lock) => lock,
            Err(rulesync_fs::Error::AlreadyLocked { path }) => {
                tracing::warn!(lock = %path.display(), "Deployment already in progress");
                return Err(Error::AlreadyRunning { lock_path: path });
            }
            Err(e) => return Err(e.into()),
        };

        let mut run = Run::new(self);
        tracing::info!(
            node = %self.config.node_id,
            source = %self.transport.describe(),
            force = options.force,
            dry_run = options.dry_run,
            "Starting deployment"
        );

        if options.dry_run {
            run.plan_only();
            return Ok(run.into_report(true));
        }

        run.deploy(options.force);
        let mut report = run.into_report(false);
        self.publish(&mut report);
        Ok(report)
    }

    /// Record the finished attempt. Failures here never change the outcome.
    fn publish(&self, report: &mut RunReport) {
        if let Some(ledger) = &self.ledger
            && let Err(e) = ledger.record_deployment(&report.record)
        {
            tracing::error!(id = %report.record.id, error = %e, "Failed to write deployment to ledger");
            report.ledger_error = Some(e.to_string());
        }

        if !self.config.report {
            return;
        }
        if let Some(reporter) = &self.reporter {
            let record = &report.record;
            let payload = DeploymentReport {
                rules_count: record.files_applied.rules,
                decoders_count: record.files_applied.decoders,
                success: record.outcome.is_success(),
                error: record.error_detail.clone().unwrap_or_default(),
                server_id: record.node_id.clone(),
                timestamp: record.finished_at.unwrap_or(record.started_at),
            };
            if let Err(e) = reporter.report(&payload) {
                tracing::warn!(id = %record.id, error = %e, "Failed to report deployment");
                report.report_error = Some(e.to_string());
            }
        }
    }

    fn live_dir(&self, category: Category) -> &Path {
        self.config.category_dir(category)
    }

    /// Scan a live directory, retrying when a file vanishes mid-scan.
    fn scan_live(&self, category: Category) -> rulesync_fs::Result<Vec<FileDescriptor>> {
        let dir = self.live_dir(category);
        let mut attempt = 1;
        loop {
            match scan_directory(dir, &self.pattern) {
                Err(e) if e.is_vanished() && attempt < SCAN_ATTEMPTS => {
                    tracing::debug!(dir = %dir.display(), attempt, error = %e, "Live directory changed during scan, rescanning");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Plan both categories. A category the bundle does not carry leaves
    /// its live directory alone.
    fn plan_bundle(&self, bundle: &BundleTree) -> rulesync_fs::Result<BundlePlan> {
        let manifest = bundle.manifest();
        let plan_category = |category: Category| -> rulesync_fs::Result<SyncPlan> {
            if !manifest.carries(category) {
                tracing::info!(category = %category, "Bundle has no directory for category, leaving live files untouched");
                return Ok(SyncPlan::default());
            }
            Ok(plan(&self.scan_live(category)?, manifest.files(category)))
        };
        Ok(BundlePlan {
            rules: plan_category(Category::Rules)?,
            decoders: plan_category(Category::Decoders)?,
        })
    }

    /// Build a sibling of the live directory holding the desired state:
    /// every bundle file plus any live entry the pattern does not manage.
    fn stage(&self, bundle: &BundleTree, category: Category) -> Result<PathBuf> {
        let live = self.live_dir(category);
        let staged = io::sibling(live, "staged");

        let result = self.fill_staged(bundle, category, live, &staged);
        if let Err(e) = result {
            if let Err(cleanup) = io::remove_dir_if_exists(&staged) {
                tracing::warn!(path = %staged.display(), error = %cleanup, "Failed to remove staged directory");
            }
            return Err(e);
        }
        Ok(staged)
    }

    fn fill_staged(
        &self,
        bundle: &BundleTree,
        category: Category,
        live: &Path,
        staged: &Path,
    ) -> Result<()> {
        fs::create_dir_all(staged).map_err(|e| rulesync_fs::Error::io(staged, e))?;
        if let Ok(meta) = fs::metadata(live) {
            fs::set_permissions(staged, meta.permissions())
                .map_err(|e| rulesync_fs::Error::io(staged, e))?;
        }

        let source = bundle.category_dir(category);
        let wanted = bundle.manifest().files(category);
        for file in wanted {
            io::copy_file(&source.join(&file.name), &staged.join(&file.name))?;
            tracing::debug!(category = %category, file = %file.name, "Staged file");
        }

        if live.is_dir() {
            for entry in fs::read_dir(live).map_err(|e| rulesync_fs::Error::io(live, e))? {
                let entry = entry.map_err(|e| rulesync_fs::Error::io(live, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if self.pattern.matches(&name) {
                    continue;
                }
                let path = entry.path();
                let target = staged.join(&name);
                if path.is_dir() {
                    self.ops.copy_dir(&path, &target)?;
                } else if path.is_file() {
                    io::copy_file(&path, &target)?;
                }
                tracing::debug!(category = %category, entry = %name, "Preserved unmanaged entry");
            }
        }

        verify_staged(staged, &self.pattern, category, wanted)
    }
}

/// Check that the staged directory holds exactly the wanted hashes.
fn verify_staged(
    staged: &Path,
    pattern: &FilePattern,
    category: Category,
    wanted: &[FileDescriptor],
) -> Result<()> {
    let actual: BTreeMap<String, String> = scan_directory(staged, pattern)?
        .into_iter()
        .map(|f| (f.name, f.content_hash))
        .collect();
    let expected: BTreeMap<String, String> = wanted
        .iter()
        .map(|f| (f.name.clone(), f.content_hash.clone()))
        .collect();

    if actual == expected {
        return Ok(());
    }
    let mismatched: Vec<&str> = expected
        .keys()
        .chain(actual.keys())
        .filter(|name| actual.get(*name) != expected.get(*name))
        .map(String::as_str)
        .collect();
    Err(Error::Staging {
        category,
        message: format!("hash mismatch for {}", mismatched.join(", ")),
    })
}

/// Mutable state of a single run.
struct Run<'a> {
    orchestrator: &'a Orchestrator,
    record: DeploymentRecord,
    transitions: Vec<DeployState>,
    plan: Option<BundlePlan>,
    snapshot: Option<BackupSnapshot>,
}

impl<'a> Run<'a> {
    fn new(orchestrator: &'a Orchestrator) -> Self {
        Self {
            orchestrator,
            record: DeploymentRecord::start(&orchestrator.config.node_id),
            transitions: vec![DeployState::Idle],
            plan: None,
            snapshot: None,
        }
    }

    fn enter(&mut self, state: DeployState) {
        tracing::info!(id = %self.record.id, state = %state, "Deployment state");
        self.transitions.push(state);
    }

    fn into_report(self, dry_run: bool) -> RunReport {
        RunReport {
            backup: self.snapshot.as_ref().map(|s| s.path().to_path_buf()),
            record: self.record,
            transitions: self.transitions,
            plan: self.plan,
            dry_run,
            ledger_error: None,
            report_error: None,
        }
    }

    fn fail(&mut self, detail: String) {
        self.enter(DeployState::Failed);
        tracing::error!(
            id = %self.record.id,
            node = %self.record.node_id,
            error = %detail,
            "Deployment failed"
        );
        self.record.finish(Outcome::Failed, Some(detail));
    }

    fn commit(&mut self) {
        self.enter(DeployState::Committed);
        self.record.finish(Outcome::Success, None);
        tracing::info!(
            id = %self.record.id,
            rules = self.record.files_applied.rules,
            decoders = self.record.files_applied.decoders,
            "Deployment committed"
        );
    }

    fn fetch_and_plan(&mut self) -> Option<BundleTree> {
        let orchestrator = self.orchestrator;

        self.enter(DeployState::Fetching);
        let bundle = match orchestrator.transport.fetch_bundle() {
            Ok(bundle) => bundle,
            Err(e) => {
                self.fail(format!("fetch failed: {}", e));
                return None;
            }
        };
        self.record.generation = Some(bundle.manifest().generation.clone());

        self.enter(DeployState::Planning);
        match orchestrator.plan_bundle(&bundle) {
            Ok(plan) => {
                for category in Category::ALL {
                    let p = plan.category(category);
                    tracing::info!(
                        category = %category,
                        add = p.to_add.len(),
                        replace = p.to_replace.len(),
                        remove = p.to_remove.len(),
                        "Planned sync"
                    );
                }
                self.record.files_applied = plan.files_applied();
                self.record.action = if plan.required() {
                    DeploymentAction::Deploy
                } else {
                    DeploymentAction::Noop
                };
                self.plan = Some(plan);
                Some(bundle)
            }
            Err(e) => {
                self.fail(format!("planning failed: {}", e));
                None
            }
        }
    }

    fn plan_only(&mut self) {
        if self.fetch_and_plan().is_some() {
            self.record.finish(Outcome::Success, None);
        }
    }

    fn deploy(&mut self, force: bool) {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        self.enter(DeployState::BackingUp);
        if !config.create_backup {
            tracing::warn!(node = %config.node_id, "Backups disabled, deploying without a snapshot");
            self.record.backup_skipped = true;
        } else {
            let sources: Vec<(Category, &Path)> = Category::ALL
                .into_iter()
                .map(|c| (c, orchestrator.live_dir(c)))
                .collect();
            match BackupManager::new(&config.backup_root).create(
                &config.node_id,
                &sources,
                orchestrator.ops.as_ref(),
            ) {
                Ok(snapshot) => {
                    self.record.backup_path = Some(snapshot.path().display().to_string());
                    self.snapshot = Some(snapshot);
                }
                Err(e) if force => {
                    tracing::warn!(error = %e, "Backup failed, continuing without a snapshot (forced)");
                    self.record.backup_skipped = true;
                }
                Err(e) => {
                    self.fail(format!("backup failed: {}", e));
                    return;
                }
            }
        }

        let Some(bundle) = self.fetch_and_plan() else {
            return;
        };
        let Some(plan) = self.plan.clone() else {
            return;
        };

        if !plan.required() {
            self.enter(DeployState::Noop);
            if let Some(snapshot) = self.snapshot.take() {
                if let Err(e) = snapshot.discard() {
                    tracing::warn!(error = %e, "Failed to discard unused snapshot");
                }
                self.record.backup_path = None;
            }
            self.commit();
            return;
        }

        self.enter(DeployState::Staging);
        let mut staged: Vec<(Category, PathBuf)> = Vec::new();
        for category in Category::ALL {
            if !plan.category(category).required {
                continue;
            }
            match orchestrator.stage(&bundle, category) {
                Ok(path) => staged.push((category, path)),
                Err(e) => {
                    discard_staged(&staged);
                    self.fail(format!("staging {} failed: {}", category, e));
                    return;
                }
            }
        }

        self.enter(DeployState::Swapping);
        for (index, (category, path)) in staged.iter().enumerate() {
            if let Err(e) = orchestrator.ops.swap_dir(orchestrator.live_dir(*category), path) {
                discard_staged(&staged[index..]);
                self.roll_back(format!("swap of {} failed: {}", category, e));
                return;
            }
            tracing::info!(category = %category, "Swapped live directory");
        }

        if let Err(cause) = self.activate() {
            self.roll_back(cause);
            return;
        }

        self.commit();
    }

    /// Restart and verify the consumer. Skipped when auto restart is off.
    fn activate(&mut self) -> std::result::Result<(), String> {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        self.enter(DeployState::Activating);
        if !config.auto_restart {
            tracing::info!("Automatic restart disabled, skipping activation");
            self.enter(DeployState::Verifying);
            return Ok(());
        }
        orchestrator
            .control
            .restart()
            .map_err(|e| format!("activation failed: {}", e))?;

        self.enter(DeployState::Verifying);
        wait_until_active(
            orchestrator.control.as_ref(),
            config.verify_timeout(),
            config.verify_interval(),
        )
        .map_err(|e| format!("verification failed: {}", e))
    }

    fn roll_back(&mut self, cause: String) {
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config;

        self.enter(DeployState::RollingBack);
        tracing::warn!(id = %self.record.id, cause = %cause, "Rolling back");

        let Some(snapshot) = self.snapshot.clone() else {
            self.fail(format!("{}; no snapshot to roll back to", cause));
            return;
        };

        for category in Category::ALL {
            if let Err(e) =
                snapshot.restore(category, orchestrator.live_dir(category), orchestrator.ops.as_ref())
            {
                self.fail(format!("{}; restoring {} failed: {}", cause, category, e));
                return;
            }
        }

        let mut detail = cause;
        if config.auto_restart {
            if let Err(e) = orchestrator.control.restart() {
                self.fail(format!("{}; restart after rollback failed: {}", detail, e));
                return;
            }
            // Restored state is known-good: a failing check here is noted, not fatal.
            if let Err(e) = wait_until_active(
                orchestrator.control.as_ref(),
                config.verify_timeout(),
                config.verify_interval(),
            ) {
                tracing::warn!(id = %self.record.id, error = %e, "Service still not active after rollback");
                detail = format!("{}; still not active after rollback: {}", detail, e);
            }
        }

        self.enter(DeployState::RolledBack);
        tracing::warn!(id = %self.record.id, "Rolled back to snapshot");
        self.record.finish(Outcome::RolledBack, Some(detail));
    }
}

fn discard_staged(staged: &[(Category, PathBuf)]) {
    for (_, path) in staged {
        if let Err(e) = io::remove_dir_if_exists(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged directory");
        }
    }
}
