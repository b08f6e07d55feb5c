//! Declaration-source error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading or resolving the declaration source.
///
/// All of these are fatal: there is no partial-config fallback.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read declaration source `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("declaration source parse error")]
    Toml(#[from] toml::de::Error),

    #[error("invalid declaration: {0}")]
    Invalid(String),

    #[error("invalid glob pattern `{0}`")]
    Pattern(String, #[source] glob::PatternError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("source.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("source.toml"));

        let invalid = ConfigError::Invalid("collection `1bad` is not a valid name".into());
        assert!(format!("{invalid}").contains("1bad"));
    }
}
