use crate::types::DbId;

/// Generic domain error shared by all crates.
///
/// Billing-specific failures have their own typed enums
/// ([`crate::ledger::LedgerError`], [`crate::pricing::PricingError`]);
/// this covers the cross-cutting cases.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
