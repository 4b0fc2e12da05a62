//! Route definitions for price resolution and pricing administration.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::pricing;
use crate::state::AppState;

/// Routes mounted at `/pricing` (any authenticated caller).
///
/// ```text
/// GET /resolve -> resolve
/// GET /quote   -> quote
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/resolve", get(pricing::resolve))
        .route("/quote", get(pricing::quote))
}

/// Routes mounted at `/admin/pricing` (admin only).
///
/// ```text
/// GET  /             -> list_entries
/// POST /             -> create_entry
/// PUT  /{id}         -> update_entry
/// POST /{id}/retire  -> retire_entry
/// ```
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(pricing::list_entries).post(pricing::create_entry))
        .route("/{id}", put(pricing::update_entry))
        .route("/{id}/retire", post(pricing::retire_entry))
}
