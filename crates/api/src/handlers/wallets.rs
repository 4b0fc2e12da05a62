//! Handlers for wallet reads and the credit-limit entry point.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use centime_core::error::CoreError;
use centime_core::types::UserId;
use centime_db::models::wallet::RebuildCheck;
use centime_db::repositories::{TransactionRepo, WalletRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::{Identity, RequireAdmin};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for credit-limit updates (plan policy / admin).
#[derive(Debug, Deserialize)]
pub struct CreditLimitBody {
    pub credit_limit: i64,
}

/// GET /wallets/{user_id}
///
/// Full wallet row. Admin only.
pub async fn get_wallet(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Path(user_id): Path<UserId>,
) -> AppResult<impl IntoResponse> {
    let wallet = WalletRepo::find_by_user(&state.pool, user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "wallet",
            id: user_id,
        }))?;
    Ok(Json(DataResponse { data: wallet }))
}

/// GET /wallets/{user_id}/balance
///
/// Balance snapshot. Users may read their own; services and admins may
/// read anyone's.
pub async fn get_balance(
    State(state): State<AppState>,
    caller: Identity,
    Path(user_id): Path<UserId>,
) -> AppResult<impl IntoResponse> {
    if caller.user_id != user_id && !caller.is_service() {
        return Err(AppError::Core(CoreError::Forbidden(
            "Cannot read another user's balance".into(),
        )));
    }

    let snapshot = WalletRepo::read_balance(&state.pool, user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "wallet",
            id: user_id,
        }))?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// PUT /wallets/{user_id}/credit-limit
///
/// Set the credit limit supplied by the plan policy. Admin only.
pub async fn set_credit_limit(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Path(user_id): Path<UserId>,
    Json(body): Json<CreditLimitBody>,
) -> AppResult<impl IntoResponse> {
    if body.credit_limit < 0 {
        return Err(AppError::BadRequest(
            "credit_limit must not be negative".into(),
        ));
    }

    let wallet = WalletRepo::set_credit_limit(&state.pool, user_id, body.credit_limit).await?;
    tracing::info!(user_id, credit_limit = body.credit_limit, "Credit limit updated");
    Ok(Json(DataResponse { data: wallet }))
}

/// GET /wallets/{user_id}/rebuild-check
///
/// Audit endpoint: replay the transaction log and compare against the
/// cached wallet balance. Admin only.
pub async fn rebuild_check(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Path(user_id): Path<UserId>,
) -> AppResult<impl IntoResponse> {
    let wallet = WalletRepo::find_by_user(&state.pool, user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "wallet",
            id: user_id,
        }))?;
    let replayed = TransactionRepo::replayed_balance(&state.pool, user_id).await?;

    let check = RebuildCheck {
        user_id,
        cached_balance: wallet.token_balance,
        replayed_balance: replayed,
        consistent: wallet.token_balance == replayed,
    };
    if !check.consistent {
        tracing::error!(
            user_id,
            cached = check.cached_balance,
            replayed = check.replayed_balance,
            "Wallet cache diverged from transaction log"
        );
    }
    Ok(Json(DataResponse { data: check }))
}
