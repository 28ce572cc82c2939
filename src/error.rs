use std::path::PathBuf;
use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum AdhocError {
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Only one positional argument supported (name), got {count} for module {module}")]
    TooManyPositional { module: String, count: usize },

    #[error("Invalid runner option override: {reason}")]
    InvalidOverride { reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdhocError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        AdhocError::Config {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Inventory file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid pattern: {pattern} ({reason})")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid inventory JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("Inventory command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Executable not found: {name}")]
    ExecutableNotFound { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Executable not found: {name}")]
    ExecutableNotFound { name: String },

    #[error("Engine process failed with status {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("Unparsable engine output: {reason}")]
    InvalidOutput { reason: String },

    #[error("Inventory source unavailable: {reason}")]
    InventoryUnavailable { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdhocError>;
