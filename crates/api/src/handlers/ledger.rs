//! Handlers for ledger operations (credit, debit, hold, release, refund,
//! adjust).
//!
//! The hold handler is also where two guardrails fire: the per-turn cap
//! check before the ledger is consulted, and the insufficient-tokens alert
//! when a hold is refused. Both are caller-side concerns by design; the
//! ledger itself only enforces balances.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use centime_core::guardrail::{exceeds_turn_cap, AlertType};
use centime_core::ledger::LedgerError;
use centime_core::types::UserId;
use centime_db::models::alert::CreateAlert;
use centime_db::models::ledger::{
    AdjustRequest, CreditRequest, DebitRequest, PlaceHoldRequest, RefundRequest,
    ReleaseHoldRequest,
};
use centime_db::repositories::{AlertRepo, LedgerRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::{RequireAdmin, RequireService};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for hold release; the hold ref arrives in the path.
#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub user_id: UserId,
    pub actual_amount_tokens: i64,
    pub source: Option<String>,
    pub amount_fiat_cents: Option<i64>,
}

/// Body for manual adjustments; the acting operator comes from the
/// authenticated identity, not the payload.
#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub user_id: UserId,
    pub amount_tokens: i64,
    pub reason: String,
    pub ref_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Credit / debit
// ---------------------------------------------------------------------------

/// POST /ledger/credit
///
/// Payment webhook and plan allocation entry point. Idempotent on
/// `(user_id, ref_id)`; duplicate webhook deliveries are absorbed.
pub async fn credit(
    State(state): State<AppState>,
    RequireService(_caller): RequireService,
    Json(req): Json<CreditRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = LedgerRepo::credit(&state.pool, &req).await?;
    Ok(Json(DataResponse { data: receipt }))
}

/// POST /ledger/debit
///
/// Direct debit for a known cost.
pub async fn debit(
    State(state): State<AppState>,
    RequireService(_caller): RequireService,
    Json(req): Json<DebitRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = LedgerRepo::debit(&state.pool, &req).await?;
    Ok(Json(DataResponse { data: receipt }))
}

// ---------------------------------------------------------------------------
// Hold / release
// ---------------------------------------------------------------------------

/// POST /ledger/holds
///
/// Reserve tokens ahead of a generation call. Checks the per-turn cap
/// first; a refused hold raises an `insufficient_tokens` alert.
pub async fn place_hold(
    State(state): State<AppState>,
    RequireService(_caller): RequireService,
    Json(req): Json<PlaceHoldRequest>,
) -> AppResult<impl IntoResponse> {
    if exceeds_turn_cap(req.amount_tokens) {
        raise_alert(
            &state,
            CreateAlert::new(
                AlertType::CapExceeded,
                Some(req.user_id),
                serde_json::json!({
                    "required": req.amount_tokens,
                    "provider": req.provider,
                    "model": req.model,
                }),
            ),
        )
        .await;
        return Err(AppError::TurnCapExceeded {
            required: req.amount_tokens,
        });
    }

    match LedgerRepo::place_hold(&state.pool, &req).await {
        Ok(receipt) => Ok(Json(DataResponse { data: receipt })),
        Err(err @ LedgerError::InsufficientBalance { required, spendable }) => {
            raise_alert(
                &state,
                CreateAlert::new(
                    AlertType::InsufficientTokens,
                    Some(req.user_id),
                    serde_json::json!({
                        "required": required,
                        "spendable": spendable,
                        "provider": req.provider,
                        "model": req.model,
                    }),
                ),
            )
            .await;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// POST /ledger/holds/{ref_id}/release
///
/// Settle a hold with the actual usage (0 if the call failed before
/// producing output).
pub async fn release_hold(
    State(state): State<AppState>,
    RequireService(_caller): RequireService,
    Path(ref_id): Path<String>,
    Json(body): Json<ReleaseBody>,
) -> AppResult<impl IntoResponse> {
    let req = ReleaseHoldRequest {
        user_id: body.user_id,
        hold_ref_id: ref_id,
        actual_amount_tokens: body.actual_amount_tokens,
        source: body.source,
        amount_fiat_cents: body.amount_fiat_cents,
    };
    let receipt = LedgerRepo::release_hold(&state.pool, &req).await?;
    Ok(Json(DataResponse { data: receipt }))
}

// ---------------------------------------------------------------------------
// Refund / adjust
// ---------------------------------------------------------------------------

/// POST /ledger/refund
///
/// Admin-only; same idempotency rule as credits.
pub async fn refund(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Json(req): Json<RefundRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = LedgerRepo::refund(&state.pool, &req).await?;
    Ok(Json(DataResponse { data: receipt }))
}

/// POST /ledger/adjust
///
/// Admin-only manual correction; always requires a reason.
pub async fn adjust(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    Json(body): Json<AdjustBody>,
) -> AppResult<impl IntoResponse> {
    if body.reason.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Adjustments require a human-readable reason".into(),
        ));
    }

    let req = AdjustRequest {
        user_id: body.user_id,
        amount_tokens: body.amount_tokens,
        reason: body.reason,
        actor_id: caller.user_id,
        ref_id: body.ref_id,
    };
    let receipt = LedgerRepo::adjust(&state.pool, &req).await?;
    Ok(Json(DataResponse { data: receipt }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Raise a guardrail alert without masking the primary failure: emit
/// errors are logged, never propagated.
async fn raise_alert(state: &AppState, alert: CreateAlert) {
    if let Err(e) = AlertRepo::emit(&state.pool, &alert).await {
        tracing::error!(
            alert_type = alert.alert_type.as_str(),
            error = %e,
            "Failed to record guardrail alert"
        );
    }
}
