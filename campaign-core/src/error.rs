//! Crate-level error type.
//!
//! Each component owns a focused error enum; this type wraps them so callers
//! that drive several components can use a single `?`.

use crate::checkpoint::CheckpointError;
use crate::ledger::LedgerError;
use crate::location::StateError;
use crate::session_log::LogError;
use crate::snapshot::SessionError;

/// Main error type for the campaign engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Session snapshot error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Location state error
    #[error("Location state error: {0}")]
    State(#[from] StateError),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Session log error
    #[error("Session log error: {0}")]
    Log(#[from] LogError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
