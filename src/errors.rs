use sea_orm::error::DbErr;
use sea_orm::TransactionError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Crate-wide service error type.
///
/// Every operation surfaces one of these discriminated kinds; none are
/// downgraded to a generic success. Validation variants are raised before
/// any write; consistency variants abort the surrounding transaction.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Invalid product reference: {0}")]
    InvalidProductReference(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("Invalid adjustment on lot {lot_id}: resulting quantity would be negative")]
    InvalidAdjustment { lot_id: Uuid },

    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Helper to wrap a `DbErr` without going through `From`, useful in
    /// closures where type inference wants an explicit function.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Machine-readable kind tag for callers that match on error families.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::MissingRequiredField(_) => "missing_required_field",
            ServiceError::InvalidProductReference(_) => "invalid_product_reference",
            ServiceError::InvalidQuantity(_) => "invalid_quantity",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::InvalidAdjustment { .. } => "invalid_adjustment",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::ConcurrentModification(_) => "concurrent_modification",
            ServiceError::EventError(_) => "event_error",
            ServiceError::InternalError(_) => "internal_error",
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            ServiceError::InsufficientStock {
                requested: 10,
                available: 4
            }
            .kind(),
            "insufficient_stock"
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                from: "done".into(),
                to: "in_progress".into()
            }
            .kind(),
            "invalid_transition"
        );
    }

    #[test]
    fn transaction_error_unwraps_inner_service_error() {
        let inner = ServiceError::NotFound("lot".into());
        let wrapped: TransactionError<ServiceError> = TransactionError::Transaction(inner);
        let err: ServiceError = wrapped.into();
        assert_eq!(err.kind(), "not_found");
    }
}
