//! Caller role constants.
//!
//! Authentication happens upstream; the ledger only distinguishes between
//! end users, trusted internal services (generation pipeline, payment
//! webhook handler), and human operators.

/// End user: may read their own wallet.
pub const ROLE_USER: &str = "user";

/// Internal service: may perform ledger operations on behalf of users.
pub const ROLE_SERVICE: &str = "service";

/// Operator: full access including adjustments, refunds, pricing, alerts.
pub const ROLE_ADMIN: &str = "admin";
