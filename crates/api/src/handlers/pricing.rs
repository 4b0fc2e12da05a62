//! Handlers for price resolution, quoting, and the pricing admin surface.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use centime_core::error::CoreError;
use centime_core::pricing::cost_cents;
use centime_core::types::DbId;
use centime_db::models::pricing::{CreatePricingEntry, UpdatePricingEntry};
use centime_db::repositories::PricingRepo;
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::{Identity, RequireAdmin};
use crate::query::PriceLookupParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// A priced usage pair, reproducible from the referenced entry.
#[derive(Debug, Serialize)]
pub struct Quote {
    pub provider: String,
    pub model: String,
    pub currency: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_cents: i64,
    pub pricing_entry_id: DbId,
}

/// GET /pricing/resolve
///
/// The pricing entry whose window contains the requested instant
/// (default: now). Any authenticated caller.
pub async fn resolve(
    State(state): State<AppState>,
    _caller: Identity,
    Query(params): Query<PriceLookupParams>,
) -> AppResult<impl IntoResponse> {
    let at = params.at.unwrap_or_else(Utc::now);
    let entry = PricingRepo::resolve(
        &state.pool,
        &params.provider,
        &params.model,
        &params.currency,
        at,
    )
    .await?;
    Ok(Json(DataResponse { data: entry }))
}

/// GET /pricing/quote
///
/// Deterministic cost for a token usage pair; what the generation
/// pipeline uses to stamp fiat amounts on settlements.
pub async fn quote(
    State(state): State<AppState>,
    _caller: Identity,
    Query(params): Query<PriceLookupParams>,
) -> AppResult<impl IntoResponse> {
    let at = params.at.unwrap_or_else(Utc::now);
    let tokens_in = params.tokens_in.unwrap_or(0);
    let tokens_out = params.tokens_out.unwrap_or(0);
    if tokens_in < 0 || tokens_out < 0 {
        return Err(AppError::BadRequest("Token counts must not be negative".into()));
    }

    let entry = PricingRepo::resolve(
        &state.pool,
        &params.provider,
        &params.model,
        &params.currency,
        at,
    )
    .await?;

    let quote = Quote {
        provider: entry.provider.clone(),
        model: entry.model.clone(),
        currency: entry.currency.clone(),
        tokens_in,
        tokens_out,
        cost_cents: cost_cents(tokens_in, tokens_out, entry.unit_price()),
        pricing_entry_id: entry.id,
    };
    Ok(Json(DataResponse { data: quote }))
}

/// GET /admin/pricing
///
/// All entries, grouped by tuple. Admin only.
pub async fn list_entries(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
) -> AppResult<impl IntoResponse> {
    let entries = PricingRepo::list_all(&state.pool).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// POST /admin/pricing
///
/// Create an entry; overlapping windows are rejected with the conflicting
/// entry's id. Admin only.
pub async fn create_entry(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Json(input): Json<CreatePricingEntry>,
) -> AppResult<impl IntoResponse> {
    let entry = PricingRepo::create(&state.pool, &input).await?;
    tracing::info!(
        provider = %entry.provider,
        model = %entry.model,
        currency = %entry.currency,
        entry_id = entry.id,
        "Pricing entry created"
    );
    Ok(Json(DataResponse { data: entry }))
}

/// PUT /admin/pricing/{id}
///
/// Update prices or move the window (re-checked for overlap). Admin only.
pub async fn update_entry(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePricingEntry>,
) -> AppResult<impl IntoResponse> {
    let entry = PricingRepo::update(&state.pool, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "pricing entry",
            id,
        }))?;
    Ok(Json(DataResponse { data: entry }))
}

/// POST /admin/pricing/{id}/retire
///
/// Close the entry's window at now; idempotent. Admin only.
pub async fn retire_entry(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let entry = PricingRepo::retire(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "pricing entry",
            id,
        }))?;
    Ok(Json(DataResponse { data: entry }))
}
