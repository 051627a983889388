//! Render error types

use deckhand_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    /// The resolved values cannot be turned into resources
    #[error("Render error at '{path}': {reason}")]
    #[diagnostic(code(deckhand::render))]
    Render {
        path: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(
        code(deckhand::config),
        help("check the value layers against `deckhand schema`")
    )]
    Config(#[from] CoreError),

    #[error("YAML error: {0}")]
    #[diagnostic(code(deckhand::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    pub fn render(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.into(),
            help: None,
        }
    }

    pub fn render_with_help(
        path: impl Into<String>,
        reason: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.into(),
            help: Some(help.into()),
        }
    }

    /// Configuration path the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Render { path, .. } => Some(path),
            Self::Config(err) => err.path(),
            Self::Yaml(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
