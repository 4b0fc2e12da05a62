//! Route definitions for the `/wallets` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::wallets;
use crate::state::AppState;

/// Routes mounted at `/wallets`.
///
/// ```text
/// GET /{user_id}                  -> get_wallet
/// GET /{user_id}/balance          -> get_balance
/// PUT /{user_id}/credit-limit     -> set_credit_limit
/// GET /{user_id}/rebuild-check    -> rebuild_check
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", get(wallets::get_wallet))
        .route("/{user_id}/balance", get(wallets::get_balance))
        .route("/{user_id}/credit-limit", put(wallets::set_credit_limit))
        .route("/{user_id}/rebuild-check", get(wallets::rebuild_check))
}
