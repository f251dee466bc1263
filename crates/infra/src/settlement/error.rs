use thiserror::Error;

use settle_core::{DomainError, ErrorClass};
use settle_orders::CollaboratorError;

use crate::command_dispatcher::DispatchError;
use crate::jobs::JobStoreError;
use crate::projections::OrderProjectionError;

/// Error returned by every [`SettlementService`](super::SettlementService) operation.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A synchronous collaborator lookup (catalog, customers) failed.
    #[error("{service} failed: {source}")]
    Collaborator {
        service: &'static str,
        #[source]
        source: CollaboratorError,
    },

    /// The order changed since it was read; re-read and retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

/// Coarse classification used by callers (e.g. HTTP status mapping).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    Concurrency,
    Collaborator,
    Internal,
}

impl SettlementError {
    pub fn collaborator(service: &'static str, source: CollaboratorError) -> Self {
        SettlementError::Collaborator { service, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Domain(DomainError::NotFound) => ErrorKind::NotFound,
            SettlementError::Domain(e) => match e.class() {
                ErrorClass::Validation => ErrorKind::Validation,
                ErrorClass::State => ErrorKind::State,
                ErrorClass::Concurrency => ErrorKind::Concurrency,
            },
            // Unknown product or customer in a cart is a bad request.
            SettlementError::Collaborator {
                source: CollaboratorError::NotFound(_),
                ..
            } => ErrorKind::Validation,
            SettlementError::Collaborator { .. } => ErrorKind::Collaborator,
            SettlementError::Concurrency(_) => ErrorKind::Concurrency,
            SettlementError::Infrastructure(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::Domain(e) => e.code(),
            SettlementError::Collaborator {
                source: CollaboratorError::NotFound(_),
                ..
            } => "unknown_reference",
            SettlementError::Collaborator { .. } => "collaborator_unavailable",
            SettlementError::Concurrency(_) => "concurrent_modification",
            SettlementError::Infrastructure(_) => "internal",
        }
    }
}

impl From<DispatchError> for SettlementError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(DomainError::ConcurrentModification(msg))
            | DispatchError::Concurrency(msg) => SettlementError::Concurrency(msg),
            DispatchError::Domain(e) => SettlementError::Domain(e),
            other => SettlementError::Infrastructure(other.to_string()),
        }
    }
}

impl From<OrderProjectionError> for SettlementError {
    fn from(value: OrderProjectionError) -> Self {
        SettlementError::Infrastructure(value.to_string())
    }
}

impl From<JobStoreError> for SettlementError {
    fn from(value: JobStoreError) -> Self {
        SettlementError::Infrastructure(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_error_classes() {
        assert_eq!(
            SettlementError::from(DomainError::EmptyOrder).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SettlementError::from(DomainError::not_found()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SettlementError::from(DomainError::OrderNotPayable { status: "voided" }).kind(),
            ErrorKind::State
        );
        assert_eq!(
            SettlementError::from(DispatchError::Concurrency("v3 != v2".to_string())).kind(),
            ErrorKind::Concurrency
        );
        assert_eq!(
            SettlementError::collaborator("catalog", CollaboratorError::NotFound("p".to_string()))
                .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SettlementError::collaborator("catalog", CollaboratorError::Unavailable("down".to_string()))
                .kind(),
            ErrorKind::Collaborator
        );
    }
}
