//! Collaborators that fail on demand

use rulesync_fs::{DirectoryOps, Error, NativeDirectoryOps, Result};
use rulesync_ledger::{DeploymentRecord, DeploymentSink};
use rulesync_transport::{DeploymentReport, DeploymentReporter, TransportError};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Native directory operations that fail the Nth swap (1-based).
#[derive(Debug, Clone)]
pub struct FaultyOps {
    fail_on_swap: usize,
    swaps: Arc<AtomicUsize>,
}

impl FaultyOps {
    pub fn fail_swap(n: usize) -> Self {
        Self {
            fail_on_swap: n,
            swaps: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn swaps(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }
}

impl DirectoryOps for FaultyOps {
    fn copy_dir(&self, src: &Path, dst: &Path) -> Result<u64> {
        NativeDirectoryOps.copy_dir(src, dst)
    }

    fn swap_dir(&self, live: &Path, staged: &Path) -> Result<()> {
        let n = self.swaps.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on_swap {
            return Err(Error::io(live, io::Error::other("injected swap failure")));
        }
        NativeDirectoryOps.swap_dir(live, staged)
    }
}

/// Ledger that rejects every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenLedger;

impl DeploymentSink for BrokenLedger {
    fn record_deployment(&self, _record: &DeploymentRecord) -> rulesync_ledger::Result<Uuid> {
        Err(rulesync_ledger::Error::Io {
            path: "/dev/full".into(),
            source: io::Error::other("disk full"),
        })
    }
}

/// In-memory ledger that keeps every record.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<Vec<DeploymentRecord>>>,
}

impl MemoryLedger {
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DeploymentSink for MemoryLedger {
    fn record_deployment(&self, record: &DeploymentRecord) -> rulesync_ledger::Result<Uuid> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(record.id)
    }
}

/// Reporter that keeps payloads and optionally fails.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<DeploymentReport>>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<DeploymentReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DeploymentReporter for RecordingReporter {
    fn report(&self, report: &DeploymentReport) -> rulesync_transport::Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        if self.fail {
            return Err(TransportError::Network {
                url: "http://authority.invalid/deploy".into(),
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}
