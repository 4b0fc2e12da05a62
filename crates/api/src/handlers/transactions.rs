//! Handlers for transaction log queries.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use centime_db::models::transaction::TransactionQuery;
use centime_db::repositories::TransactionRepo;

use crate::error::AppResult;
use crate::middleware::identity::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /transactions
///
/// Filtered, cursor-paginated view of the append-only log, newest first.
/// Admin only.
pub async fn list_transactions(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Query(params): Query<TransactionQuery>,
) -> AppResult<impl IntoResponse> {
    let page = TransactionRepo::query(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: page }))
}
