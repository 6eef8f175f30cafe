//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business/domain failure raised before any
/// persistent write, or causing the whole atomic unit to roll back. The only
/// retryable variant is `LockContention`; retrying is the caller's decision,
/// never this engine's.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A quantity was zero, negative, or otherwise malformed for the operation.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A unit cost was zero, negative, or otherwise malformed.
    #[error("invalid unit cost: {0}")]
    InvalidUnitCost(String),

    /// Item/location/document does not belong to the acting tenant.
    #[error("tenant scope mismatch: {0}")]
    ScopeMismatch(String),

    /// The item type does not participate in quantity tracking.
    #[error("unsupported item type: {0}")]
    UnsupportedItemType(String),

    /// The item is missing a required ledger account mapping.
    #[error("missing account mapping: {0}")]
    MissingAccountMapping(String),

    /// Applying the event would drive a tracked quantity below zero.
    #[error("negative quantity: {0}")]
    NegativeQuantity(String),

    /// On-hand stock is insufficient for the requested shipment.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    /// Available (on-hand minus committed) stock is insufficient to commit.
    #[error("insufficient available stock: {0}")]
    InsufficientAvailable(String),

    /// The costing engine produced no positive cost basis.
    #[error("missing cost basis: {0}")]
    MissingCostBasis(String),

    /// A receipt event is already linked to a different vendor bill.
    #[error("receipt already billed: {0}")]
    AlreadyBilled(String),

    /// Landed-cost allocation lines do not sum to the batch total.
    #[error("allocation mismatch: {0}")]
    AllocationMismatch(String),

    /// The landed-cost batch was already applied (terminal state).
    #[error("batch already applied: {0}")]
    AlreadyApplied(String),

    /// A journal entry's debits and credits do not balance.
    #[error("unbalanced journal entry: {0}")]
    UnbalancedJournal(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Row-lock contention (poisoned or timed-out lock). Retryable by the caller.
    #[error("lock contention: {0}")]
    LockContention(String),
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_unit_cost(msg: impl Into<String>) -> Self {
        Self::InvalidUnitCost(msg.into())
    }

    pub fn scope_mismatch(msg: impl Into<String>) -> Self {
        Self::ScopeMismatch(msg.into())
    }

    pub fn unsupported_item_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedItemType(msg.into())
    }

    pub fn missing_account_mapping(msg: impl Into<String>) -> Self {
        Self::MissingAccountMapping(msg.into())
    }

    pub fn negative_quantity(msg: impl Into<String>) -> Self {
        Self::NegativeQuantity(msg.into())
    }

    pub fn insufficient_stock(msg: impl Into<String>) -> Self {
        Self::InsufficientStock(msg.into())
    }

    pub fn insufficient_available(msg: impl Into<String>) -> Self {
        Self::InsufficientAvailable(msg.into())
    }

    pub fn missing_cost_basis(msg: impl Into<String>) -> Self {
        Self::MissingCostBasis(msg.into())
    }

    pub fn already_billed(msg: impl Into<String>) -> Self {
        Self::AlreadyBilled(msg.into())
    }

    pub fn allocation_mismatch(msg: impl Into<String>) -> Self {
        Self::AllocationMismatch(msg.into())
    }

    pub fn already_applied(msg: impl Into<String>) -> Self {
        Self::AlreadyApplied(msg.into())
    }

    pub fn unbalanced_journal(msg: impl Into<String>) -> Self {
        Self::UnbalancedJournal(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn lock_contention(msg: impl Into<String>) -> Self {
        Self::LockContention(msg.into())
    }

    /// Whether the caller may safely retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention(_))
    }
}
