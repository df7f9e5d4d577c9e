//! Bundle manifest: per-category file descriptors plus a generation marker

use rulesync_fs::{FileDescriptor, FilePattern, scan_directory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The two configuration categories carried by a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rules,
    Decoders,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Rules, Category::Decoders];

    /// Sub-directory name inside a bundle tree.
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Rules => "rules",
            Category::Decoders => "decoders",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Desired state of a bundle.
///
/// Descriptor lists are kept ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Timestamp, archive checksum or commit id identifying this bundle
    #[serde(default, alias = "timestamp")]
    pub generation: String,
    #[serde(default)]
    pub rules: Vec<FileDescriptor>,
    #[serde(default)]
    pub decoders: Vec<FileDescriptor>,
    /// Categories whose directory the bundle does not carry at all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub absent: Vec<Category>,
}

impl Manifest {
    pub fn new(
        generation: impl Into<String>,
        rules: Vec<FileDescriptor>,
        decoders: Vec<FileDescriptor>,
    ) -> Self {
        let mut manifest = Self {
            generation: generation.into(),
            rules,
            decoders,
            absent: Vec::new(),
        };
        manifest.sort();
        manifest
    }

    /// Build a manifest by scanning `<root>/rules` and `<root>/decoders`.
    ///
    /// A missing category directory is recorded in `absent` rather than
    /// read as an empty category.
    pub fn scan(
        root: &Path,
        pattern: &FilePattern,
        generation: impl Into<String>,
    ) -> rulesync_fs::Result<Self> {
        let rules = scan_directory(&root.join(Category::Rules.dir_name()), pattern)?;
        let decoders = scan_directory(&root.join(Category::Decoders.dir_name()), pattern)?;
        let mut manifest = Self::new(generation, rules, decoders);
        manifest.absent = Category::ALL
            .into_iter()
            .filter(|c| !root.join(c.dir_name()).is_dir())
            .collect();
        Ok(manifest)
    }

    /// Whether the bundle has a directory for `category`, even an empty one.
    pub fn carries(&self, category: Category) -> bool {
        !self.absent.contains(&category)
    }

    /// Restore name ordering, e.g. after deserializing a remote listing.
    pub fn sort(&mut self) {
        self.rules.sort_by(|a, b| a.name.cmp(&b.name));
        self.decoders.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn files(&self, category: Category) -> &[FileDescriptor] {
        match category {
            Category::Rules => &self.rules,
            Category::Decoders => &self.decoders,
        }
    }

    /// Look a file up by name across both categories, rules first.
    pub fn find(&self, name: &str) -> Option<(Category, &FileDescriptor)> {
        Category::ALL.into_iter().find_map(|category| {
            self.files(category)
                .iter()
                .find(|f| f.name == name)
                .map(|f| (category, f))
        })
    }

    pub fn total_files(&self) -> usize {
        self.rules.len() + self.decoders.len()
    }
}
