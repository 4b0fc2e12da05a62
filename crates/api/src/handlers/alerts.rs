//! Handlers for guardrail alert review and acknowledgement.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use centime_core::error::CoreError;
use centime_core::types::DbId;
use centime_db::models::alert::AlertQuery;
use centime_db::repositories::AlertRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /admin/alerts
///
/// List alerts with filters, newest first. Admin only.
pub async fn list_alerts(
    State(state): State<AppState>,
    RequireAdmin(_caller): RequireAdmin,
    Query(params): Query<AlertQuery>,
) -> AppResult<impl IntoResponse> {
    let alerts = AlertRepo::query(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: alerts }))
}

/// POST /admin/alerts/{id}/ack
///
/// Acknowledge an alert. Idempotent: re-acknowledging returns the record
/// unchanged. Admin only.
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let alert = AlertRepo::acknowledge(&state.pool, id, caller.user_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "alert",
            id,
        }))?;
    Ok(Json(DataResponse { data: alert }))
}
