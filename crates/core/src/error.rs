//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere; the
/// storage layer maps its own failures into `TransientConflict` / `Storage`
/// at the manager boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (item or reservation).
    #[error("not found: {0}")]
    NotFound(String),

    /// The reservation belongs to another holder.
    #[error("reservation belongs to another holder")]
    Ownership,

    /// No units left to reserve.
    #[error("out of stock")]
    OutOfStock,

    /// The holder already has an active reservation for this item.
    #[error("holder already has an active reservation for this item")]
    DuplicateReservation,

    /// The reservation already left the active state (completed or expired).
    #[error("reservation is no longer active")]
    ReservationNotActive,

    /// The reservation's lease has timed out; the reclaimer owns it now.
    #[error("reservation has expired")]
    ReservationExpired,

    /// Storage-level contention that exhausted the internal retry budget.
    /// Safe for the caller to retry the whole call.
    #[error("transient conflict: {0}")]
    TransientConflict(String),

    /// A ledger increment would exceed total stock. Indicates an invariant
    /// breach elsewhere; treated as fatal and alerting, never clamped silently.
    #[error("ledger overrun: {0}")]
    LedgerOverrun(String),

    /// An unclassified storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transient_conflict(msg: impl Into<String>) -> Self {
        Self::TransientConflict(msg.into())
    }

    pub fn ledger_overrun(msg: impl Into<String>) -> Self {
        Self::LedgerOverrun(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable identifier for this failure kind.
    ///
    /// Callers (e.g. the HTTP layer) key response decisions off these codes;
    /// they are part of the public contract and must not change.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound(_) => "not_found",
            Self::Ownership => "ownership",
            Self::OutOfStock => "out_of_stock",
            Self::DuplicateReservation => "duplicate_reservation",
            Self::ReservationNotActive => "reservation_not_active",
            Self::ReservationExpired => "reservation_expired",
            Self::TransientConflict(_) => "transient_conflict",
            Self::LedgerOverrun(_) => "ledger_overrun",
            Self::Storage(_) => "storage",
        }
    }
}
