//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown key '{path}'{}{}", layer_suffix(.layer), suggestion_suffix(.suggestion))]
    UnknownKey {
        path: String,
        layer: Option<String>,
        suggestion: Option<String>,
    },

    #[error("Type mismatch at '{path}': expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid value at '{path}': {reason}")]
    Validation { path: String, reason: String },

    #[error("Merge conflict at '{path}': {reason}")]
    MergeConflict { path: String, reason: String },

    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart.yaml: {message}")]
    InvalidChart { message: String },

    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("Invalid --set format: '{arg}'. Expected key=value")]
    InvalidSet { arg: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

fn layer_suffix(layer: &Option<String>) -> String {
    match layer {
        Some(l) => format!(" in layer '{}'", l),
        None => String::new(),
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

impl CoreError {
    /// Configuration path the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnknownKey { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::Validation { path, .. }
            | Self::MergeConflict { path, .. } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
