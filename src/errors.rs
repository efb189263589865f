use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrinterError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// The print-management tool exited non-zero or printed something we could not parse.
    #[error("{command} failed: {output}")]
    Command { command: String, output: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Failure reported by the page-side automation script, passed through verbatim.
    #[error("{0}")]
    Delegated(String),

    #[error("Print surface error: {0}")]
    Surface(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Monitor error: {0}")]
    Monitor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PrinterError {
    pub fn command(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            output: output.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, PrinterError>;
