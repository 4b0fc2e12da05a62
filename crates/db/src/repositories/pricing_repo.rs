//! Repository for the `pricing_entries` table.
//!
//! Windows are half-open `[effective_from, effective_to)`. Retirement
//! closes a window rather than deleting the row, preserving historical
//! auditability: any past charge can be re-priced from the table.

use centime_core::pricing::{windows_overlap, PricingError};
use centime_core::types::{DbId, Timestamp};
use chrono::Utc;
use sqlx::PgPool;

use crate::models::pricing::{CreatePricingEntry, PricingEntry, UpdatePricingEntry};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, provider, model, currency, input_per_1k_cents, \
    output_per_1k_cents, effective_from, effective_to, created_at, updated_at";

/// Provides price resolution and the admin write surface.
pub struct PricingRepo;

impl PricingRepo {
    /// Resolve the price whose window contains `at`.
    ///
    /// Fails with `NoPriceForWindow` when no entry matches; callers must
    /// refuse to bill rather than guess.
    pub async fn resolve(
        pool: &PgPool,
        provider: &str,
        model: &str,
        currency: &str,
        at: Timestamp,
    ) -> Result<PricingEntry, PricingError> {
        let query = format!(
            "SELECT {COLUMNS} FROM pricing_entries
             WHERE provider = $1 AND model = $2 AND currency = $3
               AND effective_from <= $4
               AND (effective_to IS NULL OR effective_to > $4)
             ORDER BY effective_from DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, PricingEntry>(&query)
            .bind(provider)
            .bind(model)
            .bind(currency)
            .bind(at)
            .fetch_optional(pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| PricingError::NoPriceForWindow {
                provider: provider.to_string(),
                model: model.to_string(),
                currency: currency.to_string(),
                at,
            })
    }

    /// Find an entry by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PricingEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pricing_entries WHERE id = $1");
        sqlx::query_as::<_, PricingEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all entries grouped by tuple, newest window first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<PricingEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pricing_entries
             ORDER BY provider, model, currency, effective_from DESC"
        );
        sqlx::query_as::<_, PricingEntry>(&query).fetch_all(pool).await
    }

    /// Create an entry after rejecting window overlaps for the tuple.
    pub async fn create(
        pool: &PgPool,
        input: &CreatePricingEntry,
    ) -> Result<PricingEntry, PricingError> {
        let from = input.effective_from.unwrap_or_else(Utc::now);
        check_window(from, input.effective_to)?;

        let existing =
            Self::entries_for_tuple(pool, &input.provider, &input.model, &input.currency)
                .await
                .map_err(storage)?;
        if let Some(conflicting_id) = find_conflict(&existing, from, input.effective_to, None) {
            return Err(PricingError::OverlappingWindow { conflicting_id });
        }

        let query = format!(
            "INSERT INTO pricing_entries
                (provider, model, currency, input_per_1k_cents,
                 output_per_1k_cents, effective_from, effective_to)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PricingEntry>(&query)
            .bind(&input.provider)
            .bind(&input.model)
            .bind(&input.currency)
            .bind(input.input_per_1k_cents)
            .bind(input.output_per_1k_cents)
            .bind(from)
            .bind(input.effective_to)
            .fetch_one(pool)
            .await
            .map_err(storage)
    }

    /// Update an entry. Window changes re-run the overlap check against
    /// the tuple's other entries. Returns `None` for an unknown id.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdatePricingEntry,
    ) -> Result<Option<PricingEntry>, PricingError> {
        let Some(current) = Self::find_by_id(pool, id).await.map_err(storage)? else {
            return Ok(None);
        };

        let from = input.effective_from.unwrap_or(current.effective_from);
        let to = input.effective_to.or(current.effective_to);
        check_window(from, to)?;

        let entries =
            Self::entries_for_tuple(pool, &current.provider, &current.model, &current.currency)
                .await
                .map_err(storage)?;
        if let Some(conflicting_id) = find_conflict(&entries, from, to, Some(id)) {
            return Err(PricingError::OverlappingWindow { conflicting_id });
        }

        let query = format!(
            "UPDATE pricing_entries SET
                input_per_1k_cents = COALESCE($2, input_per_1k_cents),
                output_per_1k_cents = COALESCE($3, output_per_1k_cents),
                effective_from = $4,
                effective_to = $5,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PricingEntry>(&query)
            .bind(id)
            .bind(input.input_per_1k_cents)
            .bind(input.output_per_1k_cents)
            .bind(from)
            .bind(to)
            .fetch_optional(pool)
            .await
            .map_err(storage)
    }

    /// Close an entry's window at now.
    ///
    /// Idempotent: retiring an already-retired entry returns it unchanged.
    /// Returns `None` for an unknown id.
    pub async fn retire(pool: &PgPool, id: DbId) -> Result<Option<PricingEntry>, PricingError> {
        let query = format!(
            "UPDATE pricing_entries SET effective_to = NOW(), updated_at = NOW()
             WHERE id = $1 AND effective_to IS NULL
             RETURNING {COLUMNS}"
        );
        let retired = sqlx::query_as::<_, PricingEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(storage)?;

        match retired {
            Some(entry) => Ok(Some(entry)),
            // Already retired (no-op) or unknown id.
            None => Self::find_by_id(pool, id).await.map_err(storage),
        }
    }

    /// All entries for a (provider, model, currency) tuple.
    async fn entries_for_tuple(
        pool: &PgPool,
        provider: &str,
        model: &str,
        currency: &str,
    ) -> Result<Vec<PricingEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pricing_entries
             WHERE provider = $1 AND model = $2 AND currency = $3
             ORDER BY effective_from"
        );
        sqlx::query_as::<_, PricingEntry>(&query)
            .bind(provider)
            .bind(model)
            .bind(currency)
            .fetch_all(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn storage(e: sqlx::Error) -> PricingError {
    PricingError::Unavailable(e.to_string())
}

/// Reject a window that ends at or before it starts.
fn check_window(from: Timestamp, to: Option<Timestamp>) -> Result<(), PricingError> {
    if let Some(to) = to {
        if to <= from {
            return Err(PricingError::InvalidWindow(format!(
                "effective_to {to} must be after effective_from {from}"
            )));
        }
    }
    Ok(())
}

/// First committed entry whose window overlaps the candidate, skipping
/// `exclude` (the entry being updated).
fn find_conflict(
    entries: &[PricingEntry],
    from: Timestamp,
    to: Option<Timestamp>,
    exclude: Option<DbId>,
) -> Option<DbId> {
    entries
        .iter()
        .filter(|e| exclude.map_or(true, |x| e.id != x))
        .find(|e| windows_overlap(e.effective_from, e.effective_to, from, to))
        .map(|e| e.id)
}
