use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

/// Errors returned by the inventory engine.
///
/// Every variant is operational: callers are expected to inspect it and react
/// (surface it to the user, retry, pick another location) rather than treat it
/// as a bug.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient inventory for item {item_id}: available {available}, requested {requested}")]
    InsufficientInventory {
        item_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error("Business rule violated: {0}")]
    BusinessLogic(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    pub fn not_found(kind: &str, id: Uuid) -> Self {
        ServiceError::NotFound(format!("{} {} not found", kind, id))
    }

    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::InsufficientInventory { .. } => "insufficient_inventory",
            Self::BusinessLogic(_) => "business_logic",
            Self::Conflict(_) => "conflict",
            Self::ValidationError(_) => "validation_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Whether re-running the whole operation may succeed: a lost version
    /// check, or a write that lost a lock race in the database itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification(_) => true,
            Self::DatabaseError(err) => crate::db::is_lock_contention(err),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_inventory_message_carries_quantities() {
        let err = ServiceError::InsufficientInventory {
            item_id: Uuid::nil(),
            available: 100,
            requested: 101,
        };
        let message = err.to_string();
        assert!(message.contains("available 100"));
        assert!(message.contains("requested 101"));
        assert_eq!(err.error_code(), "insufficient_inventory");
    }

    #[test]
    fn conflicts_and_lock_contention_are_retryable() {
        assert!(ServiceError::ConcurrentModification(Uuid::new_v4()).is_retryable());
        assert!(ServiceError::db_error(DbErr::Custom(
            "error returned from database: (code: 5) database is locked".into()
        ))
        .is_retryable());
        assert!(!ServiceError::BusinessLogic("x".into()).is_retryable());
        assert!(!ServiceError::db_error(DbErr::Custom("boom".into())).is_retryable());
    }
}
