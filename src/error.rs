//! Build error taxonomy.
//!
//! | Variant        | Scope                               |
//! |----------------|-------------------------------------|
//! | `Validation`   | one file, surfaced to the transform |
//! | `Discovery`    | one collection, fatal               |
//! | `Frontmatter`  | one file, fatal for its group       |
//! | `GenerationIo` | whole regeneration pass, fatal      |
//!
//! Configuration failures live in [`crate::config::ConfigError`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Offending field, if the validator can name one.
    pub field: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "`{field}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors raised by discovery, generation and the per-file transform.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A document header failed its collection schema.
    ///
    /// File-scoped: generation of sibling files continues, but the transform
    /// for this file fails with the full issue list.
    #[error("invalid frontmatter in `{}`: {}", path.display(), format_issues(issues))]
    Validation { path: PathBuf, issues: Vec<Issue> },

    /// A declared collection directory could not be scanned.
    #[error("failed to scan collection directory `{}`", dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document header could not be read while generating async entries.
    #[error("failed to read frontmatter from `{}`", path.display())]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A generated module could not be written.
    #[error("failed to write generated module `{}`", path.display())]
    GenerationIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(Issue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
