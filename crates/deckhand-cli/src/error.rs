//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use deckhand_core::CoreError;
use deckhand_engine::EngineError;
use deckhand_source::SourceError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// A layer or the resolved values violate the schema
    #[error("Validation failed: {message}")]
    #[diagnostic(code(deckhand::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Resource rendering failed
    #[error("Render error: {message}")]
    #[diagnostic(code(deckhand::cli::render))]
    Render {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart structure or loading error
    #[error("Chart error: {message}")]
    #[diagnostic(code(deckhand::cli::chart))]
    Chart {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(deckhand::cli::io))]
    Io { message: String },

    /// A value layer could not be retrieved
    #[error("Source error: {message}")]
    #[diagnostic(code(deckhand::cli::source))]
    Source {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(deckhand::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Source { .. } => exit_codes::SOURCE_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a chart error
    pub fn chart(message: impl Into<String>) -> Self {
        Self::Chart {
            message: message.into(),
            help: None,
        }
    }

    /// Prefix the message, keeping the kind (and exit code)
    pub fn with_context(mut self, context: &str) -> Self {
        match &mut self {
            CliError::Validation { message, .. }
            | CliError::Render { message, .. }
            | CliError::Chart { message, .. }
            | CliError::Io { message }
            | CliError::Source { message, .. }
            | CliError::Internal { message } => {
                *message = format!("{}: {}", context, message);
            }
        }
        self
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::UnknownKey { .. } => CliError::validation_with_help(
                message,
                "check the key against `deckhand schema`, or pass --permissive to let unknown keys through",
            ),
            CoreError::TypeMismatch { .. }
            | CoreError::Validation { .. }
            | CoreError::MergeConflict { .. }
            | CoreError::InvalidSet { .. }
            | CoreError::YamlParse(_)
            | CoreError::JsonParse(_) => CliError::Validation {
                message,
                help: None,
            },
            CoreError::ChartNotFound { .. } => CliError::Chart {
                message,
                help: Some("a chart is a directory containing chart.yaml".to_string()),
            },
            CoreError::InvalidChart { .. }
            | CoreError::InvalidSchema { .. }
            | CoreError::InvalidVersion(_) => CliError::chart(message),
            CoreError::Io(_) => CliError::Io { message },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(core) => core.into(),
            EngineError::Render { ref help, .. } => CliError::Render {
                help: help.clone(),
                message: err.to_string(),
            },
            EngineError::Yaml(_) => CliError::Render {
                message: err.to_string(),
                help: None,
            },
        }
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        let help = match &err {
            SourceError::Timeout { .. } => Some("raise the limit with --timeout".to_string()),
            SourceError::InvalidLocation { .. } => {
                Some("values files are local paths or http(s):// URLs".to_string())
            }
            _ => None,
        };
        match err {
            // A malformed layer document is a values problem, not a retrieval one
            SourceError::Parse { .. } => CliError::Validation {
                message: err.to_string(),
                help,
            },
            _ => CliError::Source {
                message: err.to_string(),
                help,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
