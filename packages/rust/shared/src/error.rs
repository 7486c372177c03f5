//! Error types for noirmap.
//!
//! Library crates use [`MapperError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all noirmap operations.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The repository could not be obtained (unreachable, invalid reference,
    /// unsupported revision).
    #[error("acquisition error: {message}")]
    Acquisition { message: String },

    /// The endpoint scanner failed or produced unparseable output.
    #[error("discovery error: {message}")]
    Discovery { message: String },

    /// The collection schema cannot represent an item.
    #[error("assembly error: {message}")]
    Assembly { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an acquisition error from any displayable message.
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition {
            message: msg.into(),
        }
    }

    /// Create a discovery error from any displayable message.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery {
            message: msg.into(),
        }
    }

    /// Create an assembly error from any displayable message.
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = MapperError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = MapperError::discovery("noir exited with status 1");
        assert!(err.to_string().starts_with("discovery error:"));
        assert!(err.to_string().contains("status 1"));
    }

    #[test]
    fn io_error_carries_path() {
        let err = MapperError::io(
            "/tmp/out.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/out.json"));
        assert!(msg.contains("denied"));
    }
}
