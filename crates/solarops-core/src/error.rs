// Error types for the automation engine
//
// Duplicates and "no technician available" are normal outcomes, not errors.
// They are expressed through WorkflowResult instead.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AutomationError>;

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found where one was required
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness or concurrency constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn database(msg: impl Into<String>) -> Self {
        StoreError::Database(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors that can occur while running the automation engine
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Missing or invalid location, unresolvable panel reference, bad patch
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ticket, technician, alert, or panel does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transactional write failure; the whole unit of work was rolled back
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Outbound fault notification failed
    #[error("Notification error: {0}")]
    Notification(String),
}

impl AutomationError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AutomationError::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AutomationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        AutomationError::Notification(msg.into())
    }
}
