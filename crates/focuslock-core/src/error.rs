//! Core error types for focuslock-core.
//!
//! This module defines the error hierarchy using thiserror. Enforcement
//! failures that callers are expected to handle (missing authorization,
//! a locked commitment session, a cancelled payment) are their own variants
//! so the CLI and any UI can surface them as non-fatal status.

use std::path::PathBuf;
use thiserror::Error;

use crate::commitment::SessionPhase;
use crate::policy::BlockingContext;

/// Core error type for focuslock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The OS restriction capability is not granted; nothing was applied.
    #[error("Screen time authorization is required to apply {context} restrictions")]
    AuthorizationRequired { context: BlockingContext },

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    /// Strict-mode schedules cannot change while their interval is running.
    #[error("Schedule '{0}' is in strict mode and currently active")]
    ScheduleLocked(String),

    #[error("Regret window not found: {0}")]
    WindowNotFound(String),

    #[error("Emergency exit is not available while the session is {phase}")]
    ExitNotAvailable { phase: SessionPhase },

    #[error("No commitment session with id {0}")]
    SessionNotFound(String),

    #[error("A commitment session is already active: {0}")]
    SessionAlreadyActive(String),

    /// Commitment settings are frozen while a session is locked.
    #[error("Commitment settings cannot change while a session is locked")]
    CommitmentLocked,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Payment was cancelled")]
    PaymentCancelled,

    /// The purchase went through but storing the exit failed. Retrying the
    /// exit stores it without charging again.
    #[error("Exit was charged (transaction {transaction_id}) but could not be recorded: {source}")]
    ExitNotRecorded {
        transaction_id: String,
        #[source]
        source: DatabaseError,
    },

    /// Every facet apply failed, so nothing would be enforced.
    #[error("No {context} restrictions could be applied: {reason}")]
    NothingApplied { context: BlockingContext, reason: String },

    /// Time-window protection can only be acknowledged, not ended.
    #[error("Time-window protection cannot be ended early")]
    CannotEndEarly,

    #[error("No regret protection is active")]
    NoActiveProtection,

    #[error("Restriction capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Shared state error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by the OS restriction capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("authorization not granted")]
    NotAuthorized,

    #[error("{operation} failed for {scope}: {message}")]
    Rejected {
        operation: &'static str,
        scope: BlockingContext,
        message: String,
    },

    #[error("restriction state unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the shared state bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Shared state storage failed: {0}")]
    Storage(String),

    #[error("Failed to open shared state at {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("Value under '{key}' could not be decoded: {message}")]
    Decode { key: String, message: String },

    #[error("Value for '{key}' could not be encoded: {message}")]
    Encode { key: String, message: String },
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    #[error("Stored row is corrupt: {0}")]
    CorruptRow(String),

    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Failed to locate data directory: {0}")]
    DataDir(String),
}

/// Validation errors for user-authored definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("A schedule named '{0}' already exists")]
    DuplicateName(String),

    #[error("At least one weekday must be selected")]
    NoWeekdays,

    #[error("Start and end time must differ")]
    EmptyTimeRange,

    #[error("Restriction set must block at least one app, category or domain")]
    EmptyRestrictions,

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
