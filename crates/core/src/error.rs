//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// One variant per failure kind surfaced to callers of the reconciliation
/// operations. Storage and transport failures live in the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The entity is not in the status the operation requires.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A delivery would push a purchase order line past its ordered quantity.
    #[error("over-delivery: {0}")]
    OverDelivery(String),

    /// A return would exceed what is still out on a dispatch line.
    #[error("over-return: {0}")]
    OverReturn(String),

    /// The guarded inventory decrement found fewer units than required.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    /// A line could not be resolved to any inventory record.
    #[error("not linked to inventory: {0}")]
    NotLinkedToInventory(String),

    /// The caller's role does not permit the action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data contradicts a domain invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Stable, message-free classification of a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidState,
    OverDelivery,
    OverReturn,
    InsufficientStock,
    NotLinkedToInventory,
    Unauthorized,
    Validation,
    NotFound,
    InvariantViolation,
    Storage,
    Timeout,
}

impl DomainError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn over_delivery(msg: impl Into<String>) -> Self {
        Self::OverDelivery(msg.into())
    }

    pub fn over_return(msg: impl Into<String>) -> Self {
        Self::OverReturn(msg.into())
    }

    pub fn insufficient_stock(msg: impl Into<String>) -> Self {
        Self::InsufficientStock(msg.into())
    }

    pub fn not_linked(msg: impl Into<String>) -> Self {
        Self::NotLinkedToInventory(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidState(_) => ErrorKind::InvalidState,
            DomainError::OverDelivery(_) => ErrorKind::OverDelivery,
            DomainError::OverReturn(_) => ErrorKind::OverReturn,
            DomainError::InsufficientStock(_) => ErrorKind::InsufficientStock,
            DomainError::NotLinkedToInventory(_) => ErrorKind::NotLinkedToInventory,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }
}
