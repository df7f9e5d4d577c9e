//! Sync planning
//!
//! Files are keyed by name within a category and compared by content
//! hash only. Modification times never drive a decision.

use rulesync_fs::FileDescriptor;
use rulesync_ledger::FilesApplied;
use rulesync_transport::Category;
use serde::Serialize;
use std::collections::BTreeMap;

/// Minimal action set for one category. Lists are ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub to_add: Vec<FileDescriptor>,
    pub to_replace: Vec<FileDescriptor>,
    pub to_remove: Vec<String>,
    pub required: bool,
}

impl SyncPlan {
    /// Number of files that will be written (added or replaced).
    pub fn files_written(&self) -> usize {
        self.to_add.len() + self.to_replace.len()
    }
}

/// Compare the live listing with the desired one.
pub fn plan(local: &[FileDescriptor], remote: &[FileDescriptor]) -> SyncPlan {
    let local: BTreeMap<&str, &FileDescriptor> =
        local.iter().map(|f| (f.name.as_str(), f)).collect();
    let remote: BTreeMap<&str, &FileDescriptor> =
        remote.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut result = SyncPlan::default();
    for (name, wanted) in &remote {
        match local.get(name) {
            None => result.to_add.push((*wanted).clone()),
            Some(current) if current.content_hash != wanted.content_hash => {
                result.to_replace.push((*wanted).clone())
            }
            Some(_) => {}
        }
    }
    result.to_remove = local
        .keys()
        .filter(|name| !remote.contains_key(*name))
        .map(|name| name.to_string())
        .collect();

    result.required =
        !(result.to_add.is_empty() && result.to_replace.is_empty() && result.to_remove.is_empty());
    result
}

/// Plans for both categories of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundlePlan {
    pub rules: SyncPlan,
    pub decoders: SyncPlan,
}

impl BundlePlan {
    pub fn category(&self, category: Category) -> &SyncPlan {
        match category {
            Category::Rules => &self.rules,
            Category::Decoders => &self.decoders,
        }
    }

    pub fn required(&self) -> bool {
        self.rules.required || self.decoders.required
    }

    pub fn files_applied(&self) -> FilesApplied {
        FilesApplied {
            rules: u32::try_from(self.rules.files_written()).unwrap_or(u32::MAX),
            decoders: u32::try_from(self.decoders.files_written()).unwrap_or(u32::MAX),
        }
    }
}
