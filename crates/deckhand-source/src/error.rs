//! Error types for layer retrieval

use std::time::Duration;
use thiserror::Error;

/// Layer retrieval errors
///
/// Kept apart from configuration errors: only these are eligible for retry.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Timed out after {after:?} loading layer '{name}'")]
    Timeout { name: String, after: Duration },

    #[error("IO error reading {location}: {message}")]
    Io { location: String, message: String },

    #[error("HTTP error: {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Layer source not found: {location}")]
    NotFound { location: String },

    #[error("Invalid layer source '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Failed to parse layer '{name}': {message}")]
    Parse { name: String, message: String },

    #[error("Layer loading cancelled")]
    Cancelled,
}

impl SourceError {
    /// Whether trying again may succeed: timeouts, I/O and network
    /// failures, server errors and rate limiting
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Io { .. } | Self::Network { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound { .. }
            | Self::InvalidLocation { .. }
            | Self::Parse { .. }
            | Self::Cancelled => false,
        }
    }

    pub(crate) fn io(location: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                location: location.to_string(),
            }
        } else {
            Self::Io {
                location: location.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if let Some(status) = e.status() {
            SourceError::Http {
                status: status.as_u16(),
                url,
            }
        } else if e.is_connect() {
            SourceError::Network {
                message: format!("Connection failed: {}", e),
            }
        } else {
            SourceError::Network {
                message: e.to_string(),
            }
        }
    }
}

/// Result type for layer retrieval
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let timeout = SourceError::Timeout {
            name: "prod".to_string(),
            after: Duration::from_secs(1),
        };
        assert!(timeout.retryable());

        let server = SourceError::Http {
            status: 503,
            url: "http://catalog/prod.yaml".to_string(),
        };
        assert!(server.retryable());

        let limited = SourceError::Http {
            status: 429,
            url: String::new(),
        };
        assert!(limited.retryable());

        let forbidden = SourceError::Http {
            status: 403,
            url: String::new(),
        };
        assert!(!forbidden.retryable());

        let parse = SourceError::Parse {
            name: "prod".to_string(),
            message: "bad".to_string(),
        };
        assert!(!parse.retryable());
        assert!(!SourceError::Cancelled.retryable());
    }

    #[test]
    fn test_io_not_found_is_final() {
        let err = SourceError::io(
            "env/missing.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SourceError::NotFound { .. }));
        assert!(!err.retryable());

        let err = SourceError::io(
            "env/locked.yaml",
            std::io::Error::new(std::io::ErrorKind::Interrupted, "interrupted"),
        );
        assert!(err.retryable());
    }
}
