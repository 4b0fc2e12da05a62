//! Route definitions for the `/admin/alerts` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::alerts;
use crate::state::AppState;

/// Routes mounted at `/admin/alerts`.
///
/// ```text
/// GET  /          -> list_alerts
/// POST /{id}/ack  -> acknowledge_alert
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(alerts::list_alerts))
        .route("/{id}/ack", post(alerts::acknowledge_alert))
}
