//! Error types for the stackplan commands.

use std::path::PathBuf;

use thiserror::Error;

use stackplan_core::StackError;

use crate::gateway::GatewayError;

/// Result type alias for command execution.
pub type Result<T> = std::result::Result<T, CommandError>;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("State belongs to stack '{found}', not '{expected}'")]
    StackMismatch { expected: String, found: String },

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Apply did not complete: {failed} failed, {blocked} blocked, {removals} removal(s) failed")]
    ApplyFailed {
        failed: usize,
        blocked: usize,
        removals: usize,
    },

    #[error("Apply was interrupted, state saved with the resources known to exist")]
    Interrupted,

    #[error("Destroy did not complete, {remaining} resource(s) remain in state")]
    DestroyFailed { remaining: usize },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Server error: {0}")]
    Server(std::io::Error),
}

impl From<dialoguer::Error> for CommandError {
    fn from(error: dialoguer::Error) -> Self {
        CommandError::Prompt(error.to_string())
    }
}
