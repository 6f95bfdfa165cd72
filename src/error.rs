//! Error types for the spend guardian

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for guardian operations
pub type Result<T> = std::result::Result<T, GuardianError>;

#[derive(Error, Debug)]
pub enum GuardianError {

    // =============================
    // User-input / precondition errors
    // =============================

    #[error("Invalid goal period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown user: {0}")]
    UnknownUser(Uuid),

    // =============================
    // Cycle-terminating errors (logged, never fatal)
    // =============================

    #[error("Goal declaration could not be parsed: {0}")]
    UnparsableGoal(String),

    #[error("Delivery rejected: {0}")]
    DeliveryRejected(String),

    // =============================
    // Collaborator / infrastructure errors
    // =============================

    #[error("Collaborator error: {0}")]
    CollaboratorError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
