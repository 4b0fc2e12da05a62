//! Pricing window math and deterministic cost computation.
//!
//! Prices are per 1K tokens in integer cents, scoped to half-open
//! `[effective_from, effective_to)` windows per (provider, model, currency)
//! tuple. All arithmetic is integer-only so a historical charge can be
//! recomputed bit-exactly for audit or dispute resolution.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Unit price
// ---------------------------------------------------------------------------

/// Per-1K-token price pair resolved for a (provider, model, currency) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrice {
    pub input_per_1k_cents: i64,
    pub output_per_1k_cents: i64,
}

/// Compute the fiat cost in integer cents for a token usage pair.
///
/// `cost = round(tokens_in/1000 * input + tokens_out/1000 * output)`,
/// rounding half-up. The intermediate sum is kept in millicents so the
/// rounding happens exactly once, on the total.
pub fn cost_cents(tokens_in: i64, tokens_out: i64, price: UnitPrice) -> i64 {
    let millicents =
        tokens_in * price.input_per_1k_cents + tokens_out * price.output_per_1k_cents;
    (millicents + 500) / 1000
}

// ---------------------------------------------------------------------------
// Window math
// ---------------------------------------------------------------------------

/// Whether the half-open window `[from, to)` contains `at`.
/// `to = None` means open-ended.
pub fn window_contains(from: Timestamp, to: Option<Timestamp>, at: Timestamp) -> bool {
    at >= from && to.map_or(true, |t| at < t)
}

/// Whether two half-open windows overlap. Adjacent windows (one ends
/// exactly where the other starts) do not.
pub fn windows_overlap(
    a_from: Timestamp,
    a_to: Option<Timestamp>,
    b_from: Timestamp,
    b_to: Option<Timestamp>,
) -> bool {
    let a_ends_after_b_starts = a_to.map_or(true, |t| t > b_from);
    let b_ends_after_a_starts = b_to.map_or(true, |t| t > a_from);
    a_ends_after_b_starts && b_ends_after_a_starts
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failure modes of pricing resolution and administration.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    /// No entry's window contains the requested instant. The caller must
    /// refuse to bill rather than guess a price.
    #[error("No price for {provider}/{model} in {currency} at {at}")]
    NoPriceForWindow {
        provider: String,
        model: String,
        currency: String,
        at: Timestamp,
    },

    /// The candidate window overlaps a committed entry for the same tuple.
    #[error("Pricing window overlaps existing entry {conflicting_id}")]
    OverlappingWindow { conflicting_id: DbId },

    #[error("Invalid pricing window: {0}")]
    InvalidWindow(String),

    #[error("Pricing storage unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
