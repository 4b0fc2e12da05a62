//! Route definitions for the `/ledger` resource.
//!
//! Mutations require the `service` role (admin for refund/adjust).

use axum::routing::post;
use axum::Router;

use crate::handlers::ledger;
use crate::state::AppState;

/// Routes mounted at `/ledger`.
///
/// ```text
/// POST /credit                     -> credit
/// POST /debit                      -> debit
/// POST /holds                      -> place_hold
/// POST /holds/{ref_id}/release     -> release_hold
/// POST /refund                     -> refund
/// POST /adjust                     -> adjust
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credit", post(ledger::credit))
        .route("/debit", post(ledger::debit))
        .route("/holds", post(ledger::place_hold))
        .route("/holds/{ref_id}/release", post(ledger::release_hold))
        .route("/refund", post(ledger::refund))
        .route("/adjust", post(ledger::adjust))
}
