use std::time::Duration;

use thiserror::Error;

use billbook_core::{DomainError, ProductId};

use crate::store::StoreError;

/// Error returned by every engine operation.
///
/// Business failures (everything above `StorageUnavailable`) carry enough
/// detail for a precise user-facing message. Unexpected storage failures are
/// logged where they are converted and surface only as [`EngineError::Internal`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The referenced entity belongs to another seller.
    #[error("{entity} {id} belongs to another seller")]
    AccessDenied { entity: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("an invoice needs at least one item")]
    EmptyItemList,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization conflict that persisted through every retry.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("internal error")]
    Internal,
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn access_denied(entity: &'static str, id: impl ToString) -> Self {
        Self::AccessDenied {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// `true` for failures caused by the request itself rather than the system.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            EngineError::StorageUnavailable(_)
                | EngineError::Timeout(_)
                | EngineError::Conflict(_)
                | EngineError::Internal
        )
    }

    /// `true` when running the whole operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    /// Attach the product to a stock failure raised by the domain layer.
    pub(crate) fn from_stock(product_id: ProductId, err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            DomainError::NotFound => EngineError::not_found("product", product_id),
            other => other.into(),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => EngineError::Validation { field, message },
            DomainError::InvalidId(message) => EngineError::Validation {
                field: "id".to_string(),
                message,
            },
            DomainError::InvalidState(msg) => EngineError::InvalidState(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => EngineError::InvalidState(format!(
                "insufficient stock: requested {requested}, available {available}"
            )),
            DomainError::NotFound => EngineError::NotFound {
                entity: "record",
                id: String::new(),
            },
            DomainError::InvariantViolation(msg) => {
                tracing::error!(error = %msg, "domain invariant violated");
                EngineError::Internal
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "storage unavailable");
                EngineError::StorageUnavailable(msg)
            }
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            other => {
                tracing::error!(error = %other, "unexpected storage failure");
                EngineError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation_keeps_field() {
        let err: EngineError = DomainError::validation("email", "is required").into();
        match err {
            EngineError::Validation { field, .. } if field == "email" => {}
            other => panic!("Expected Validation(email), got {other:?}"),
        }
    }

    #[test]
    fn stock_failure_names_product() {
        let pid = ProductId::from_number(1);
        let err = EngineError::from_stock(pid, DomainError::insufficient_stock(4, 6));
        assert_eq!(
            err,
            EngineError::InsufficientStock {
                product_id: pid,
                available: 4,
                requested: 6
            }
        );
        assert!(err.is_business());
    }

    #[test]
    fn storage_internals_are_not_leaked() {
        let err: EngineError = StoreError::Backend("relation \"x\" does not exist".into()).into();
        assert_eq!(err, EngineError::Internal);
        assert_eq!(err.to_string(), "internal error");
        assert!(!err.is_business());

        let err: EngineError = StoreError::Corrupt("bad row".into()).into();
        assert_eq!(err, EngineError::Internal);
    }

    #[test]
    fn conflicts_are_retryable() {
        let err: EngineError = StoreError::Conflict("40001".into()).into();
        assert!(err.is_retryable());
        assert!(!EngineError::EmptyItemList.is_retryable());
    }
}
