//! Error types for Interior.
//!
//! Library crates use [`InteriorError`] via `thiserror`.
//! App crates (cli/tui) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Interior operations.
#[derive(Debug, thiserror::Error)]
pub enum InteriorError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during discovery, crawl or extraction.
    #[error("network error: {0}")]
    Network(String),

    /// XML/HTML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM extraction error (API call or response parsing).
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (condition form, empty URL, bad selection).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, InteriorError>;

impl InteriorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
        let err = InteriorError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = InteriorError::validation("condition width is not a valid range");
        assert!(err.to_string().contains("width is not a valid range"));

        let err = InteriorError::Extraction("empty candidate list".into());
        assert_eq!(err.to_string(), "extraction error: empty candidate list");

        let err = InteriorError::Storage("database is opened in read-only mode".into());
        assert_eq!(
            err.to_string(),
            "storage error: database is opened in read-only mode"
        );

        let err = InteriorError::parse("urlset missing");
        assert!(matches!(err, InteriorError::Parse { .. }));
    }

    #[test]
    fn io_error_names_the_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = InteriorError::io("/tmp/interior/config.toml", source);

        let InteriorError::Io { path, source } = &err else {
            panic!("expected an I/O error");
        };
        assert_eq!(path, &PathBuf::from("/tmp/interior/config.toml"));
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "I/O error at \"/tmp/interior/config.toml\": no such file"
        );
    }
}
