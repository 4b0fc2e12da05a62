//! Pricing entry entity model and DTOs.

use centime_core::pricing::UnitPrice;
use centime_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `pricing_entries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PricingEntry {
    pub id: DbId,
    pub provider: String,
    pub model: String,
    pub currency: String,
    pub input_per_1k_cents: i64,
    pub output_per_1k_cents: i64,
    pub effective_from: Timestamp,
    /// `None` = open-ended window.
    pub effective_to: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PricingEntry {
    /// The per-1K price pair used for cost computation.
    pub fn unit_price(&self) -> UnitPrice {
        UnitPrice {
            input_per_1k_cents: self.input_per_1k_cents,
            output_per_1k_cents: self.output_per_1k_cents,
        }
    }
}

/// DTO for creating a pricing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePricingEntry {
    pub provider: String,
    pub model: String,
    pub currency: String,
    pub input_per_1k_cents: i64,
    pub output_per_1k_cents: i64,
    /// Defaults to now when omitted.
    pub effective_from: Option<Timestamp>,
    pub effective_to: Option<Timestamp>,
}

/// DTO for updating a pricing entry. Only non-`None` fields are applied.
///
/// Window fields re-run the overlap check against all other entries for
/// the same tuple before the update is applied.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePricingEntry {
    pub input_per_1k_cents: Option<i64>,
    pub output_per_1k_cents: Option<i64>,
    pub effective_from: Option<Timestamp>,
    pub effective_to: Option<Timestamp>,
}
