//! Glob-style file name patterns
//!
//! Only `*` and `?` are special. Patterns match the whole file name,
//! never a path.

use crate::{Error, Result};
use regex::Regex;

/// A compiled file name pattern such as `*.xml`.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    /// Compile a glob pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() || pattern.contains('/') || pattern.contains('\\') {
            return Err(Error::InvalidPattern {
                pattern: pattern.to_string(),
                message: "pattern must be a non-empty file name".into(),
            });
        }

        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Check whether a file name matches.
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    /// The original glob text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for FilePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
