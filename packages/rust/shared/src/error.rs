//! Error types for docbundle.
//!
//! Library crates use [`DocbundleError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The transient/permanent split drives retry eligibility: network and
//! server-side failures are retried with backoff, malformed or empty
//! responses fail the affected item immediately.

use std::path::PathBuf;

/// Top-level error type for all docbundle operations.
#[derive(Debug, thiserror::Error)]
pub enum DocbundleError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error (timeout, connect, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with a non-success HTTP status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The provider answered 2xx but the body was not what the contract
    /// promises (missing fields, unparseable JSON, `success: false`).
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// A scrape succeeded but returned no usable content.
    #[error("empty content for {url}")]
    EmptyContent { url: String },

    /// The mapper reported success but discovered no URLs at all.
    /// Distinct from [`DocbundleError::Network`]: the site answered,
    /// there is just nothing to bundle.
    #[error("no URLs found for {url}")]
    NoUrlsFound { url: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocbundleError>;

impl DocbundleError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-response error from any displayable message.
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Network errors and server-side statuses (429, 5xx) are transient.
    /// Everything else — malformed responses, empty content, config and
    /// I/O problems — is permanent and must short-circuit the retry loop.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocbundleError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = DocbundleError::NoUrlsFound {
            url: "https://docs.example.com".into(),
        };
        assert!(err.to_string().contains("no URLs found"));
    }

    #[test]
    fn transient_classification() {
        assert!(DocbundleError::Network("timed out".into()).is_transient());
        assert!(
            DocbundleError::Api {
                status: 500,
                message: "internal".into()
            }
            .is_transient()
        );
        assert!(
            DocbundleError::Api {
                status: 429,
                message: "rate limited".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn permanent_classification() {
        assert!(
            !DocbundleError::Api {
                status: 404,
                message: "not found".into()
            }
            .is_transient()
        );
        assert!(!DocbundleError::invalid_response("missing data field").is_transient());
        assert!(
            !DocbundleError::EmptyContent {
                url: "https://a".into()
            }
            .is_transient()
        );
        assert!(
            !DocbundleError::NoUrlsFound {
                url: "https://a".into()
            }
            .is_transient()
        );
    }
}
