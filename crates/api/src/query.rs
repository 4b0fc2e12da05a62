//! Shared query parameter types for API handlers.

use centime_core::types::Timestamp;
use serde::Deserialize;

/// Query parameters for price resolution and quoting.
#[derive(Debug, Deserialize)]
pub struct PriceLookupParams {
    pub provider: String,
    pub model: String,
    pub currency: String,
    /// Instant to price at; defaults to now.
    pub at: Option<Timestamp>,
    /// Token usage for quotes (ignored by plain resolution).
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
}
