//! Typed error hierarchy for the theme builder.
//!
//! One enum per subsystem:
//! - `ConfigError` for environment and `builder.toml` loading
//! - `SessionError` for session persistence and locking
//! - `ApprovalError` for operator transports that cannot answer
//! - `PhaseError` for phase execution and controller failures
//! - `GeneratorError` for AI, image and CLI collaborators
//! - `RegistryError` for phase registry and field ownership validation

use crate::phase::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .keys.join(", "))]
    MissingKeys { keys: Vec<String> },

    #[error("Invalid configuration file at {path}: {message}")]
    InvalidFile { path: PathBuf, message: String },

    #[error("Failed to read configuration file at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: String },

    #[error("Invalid session id '{id}'")]
    InvalidId { id: String },

    #[error("Session {id} is in use by another process")]
    Locked { id: String },

    #[error("Session {id} was changed by another run since it was loaded")]
    Stale { id: String },

    #[error("Session I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize session {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from operator transports.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Scripted operator ran out of answers while waiting for {expected}")]
    ScriptExhausted { expected: &'static str },

    #[error("Scripted operator expected {expected} but the next answer was {found}")]
    ScriptMismatch {
        expected: &'static str,
        found: String,
    },
}

/// Errors from a single phase execution.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase {phase} requires {requirement}")]
    MissingPrerequisite {
        phase: Phase,
        requirement: &'static str,
    },

    #[error("Phase {phase} failed: {source}")]
    Failed {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from external generators (chat completion, image, theme CLI).
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("HTTP request to {service} failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        service: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("Prediction {id} failed: {message}")]
    PredictionFailed { id: String, message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Could not parse generator response: {0}")]
    Parse(String),

    #[error("Generator I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from validating the phase registry or the field ownership table.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No handler registered for phase {0}")]
    MissingHandler(Phase),

    #[error("Phase {0} has more than one handler")]
    DuplicateHandler(Phase),

    #[error("Field ownership table has no entry for phase {0}")]
    MissingOwner(Phase),

    #[error("Field ownership table lists phase {0} more than once")]
    DuplicateOwner(Phase),

    #[error("Field ownership table entries are out of phase order at {0}")]
    OutOfOrder(Phase),

    #[error("Session field {field} is owned by both {first} and {second}")]
    FieldOwnedTwice {
        field: String,
        first: Phase,
        second: Phase,
    },

    #[error("Session field {0} has no owning phase")]
    UnownedField(String),
}
