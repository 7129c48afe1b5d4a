//! Path globbing for diff restriction.
//!
//! Patterns use `glob` syntax, where `*` also crosses `/`. A pattern without
//! `/` is matched against the file name only, so `*.toml` selects record
//! files at any depth.

use glob::Pattern;

use crate::error::{RepoError, RepoResult};

/// A compiled path pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PathGlob {
    pattern: Pattern,
    file_name_only: bool,
}

impl PathGlob {
    pub fn new(pattern: &str) -> RepoResult<Self> {
        let compiled = Pattern::new(pattern).map_err(|e| RepoError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: compiled,
            file_name_only: !pattern.contains('/'),
        })
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns `true` if `path` matches.
    pub fn matches(&self, path: &str) -> bool {
        let subject = if self.file_name_only {
            path.rsplit('/').next().unwrap_or(path)
        } else {
            path
        };
        self.pattern.matches(subject)
    }
}
