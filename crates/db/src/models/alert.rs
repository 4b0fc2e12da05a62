//! System alert entity model and DTOs.

use centime_core::guardrail::{AlertType, Severity};
use centime_core::types::{DbId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `system_alerts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SystemAlert {
    pub id: DbId,
    pub alert_type: String,
    pub severity: String,
    /// `None` for system-wide alerts.
    pub user_id: Option<UserId>,
    /// Rule-specific numeric snapshot, e.g. `{required, spendable}`.
    pub meta: serde_json::Value,
    pub created_at: Timestamp,
    pub acknowledged_at: Option<Timestamp>,
    pub acknowledged_by: Option<UserId>,
}

/// DTO for raising a new alert.
#[derive(Debug, Clone)]
pub struct CreateAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub user_id: Option<UserId>,
    pub meta: serde_json::Value,
}

impl CreateAlert {
    /// Build an alert with the rule's default severity.
    pub fn new(alert_type: AlertType, user_id: Option<UserId>, meta: serde_json::Value) -> Self {
        Self {
            alert_type,
            severity: alert_type.severity(),
            user_id,
            meta,
        }
    }
}

/// Filter set for alert list queries.
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub alert_type: Option<String>,
    pub user_id: Option<UserId>,
    /// When true, only alerts that have not been acknowledged.
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
