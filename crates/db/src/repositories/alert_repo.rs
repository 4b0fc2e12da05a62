//! Repository for the `system_alerts` table.
//!
//! Alerts are write-once; acknowledgement is the only permitted mutation.

use centime_core::guardrail::AlertType;
use centime_core::pagination::{clamp_limit, clamp_offset, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use centime_core::types::{DbId, UserId};
use sqlx::PgPool;

use crate::models::alert::{AlertQuery, CreateAlert, SystemAlert};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, alert_type, severity, user_id, meta, created_at, \
    acknowledged_at, acknowledged_by";

/// Provides emit, query, and acknowledge operations for alerts.
pub struct AlertRepo;

impl AlertRepo {
    /// Raise an alert unless an unacknowledged one of the same type is
    /// already open for the user (duplicate suppression for sweep
    /// re-runs). Returns `None` when suppressed.
    pub async fn emit(
        pool: &PgPool,
        input: &CreateAlert,
    ) -> Result<Option<SystemAlert>, sqlx::Error> {
        if Self::find_open(pool, input.alert_type, input.user_id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let query = format!(
            "INSERT INTO system_alerts (alert_type, severity, user_id, meta)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let alert = sqlx::query_as::<_, SystemAlert>(&query)
            .bind(input.alert_type.as_str())
            .bind(input.severity.as_str())
            .bind(input.user_id)
            .bind(&input.meta)
            .fetch_one(pool)
            .await?;

        tracing::warn!(
            alert_type = input.alert_type.as_str(),
            user_id = input.user_id,
            "Guardrail alert raised"
        );
        Ok(Some(alert))
    }

    /// The open (unacknowledged) alert of a type for a user, if any.
    pub async fn find_open(
        pool: &PgPool,
        alert_type: AlertType,
        user_id: Option<UserId>,
    ) -> Result<Option<SystemAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM system_alerts
             WHERE alert_type = $1
               AND user_id IS NOT DISTINCT FROM $2
               AND acknowledged_at IS NULL
             ORDER BY created_at DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, SystemAlert>(&query)
            .bind(alert_type.as_str())
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Find an alert by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SystemAlert>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM system_alerts WHERE id = $1");
        sqlx::query_as::<_, SystemAlert>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Acknowledge an alert, setting the timestamp once.
    ///
    /// Idempotent: acknowledging an already-acknowledged alert returns
    /// the record unchanged. Returns `None` for an unknown id.
    pub async fn acknowledge(
        pool: &PgPool,
        id: DbId,
        actor_id: UserId,
    ) -> Result<Option<SystemAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE system_alerts SET acknowledged_at = NOW(), acknowledged_by = $2
             WHERE id = $1 AND acknowledged_at IS NULL
             RETURNING {COLUMNS}"
        );
        let acked = sqlx::query_as::<_, SystemAlert>(&query)
            .bind(id)
            .bind(actor_id)
            .fetch_optional(pool)
            .await?;

        match acked {
            Some(alert) => Ok(Some(alert)),
            None => Self::find_by_id(pool, id).await,
        }
    }

    /// List alerts with filters and limit/offset pagination, newest first.
    pub async fn query(
        pool: &PgPool,
        params: &AlertQuery,
    ) -> Result<Vec<SystemAlert>, sqlx::Error> {
        let limit = clamp_limit(params.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT);
        let offset = clamp_offset(params.offset);

        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx = 1u32;

        if params.alert_type.is_some() {
            conditions.push(format!("alert_type = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.user_id.is_some() {
            conditions.push(format!("user_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.open_only {
            conditions.push("acknowledged_at IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM system_alerts {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let mut q = sqlx::query_as::<_, SystemAlert>(&query);
        if let Some(ref alert_type) = params.alert_type {
            q = q.bind(alert_type);
        }
        if let Some(user_id) = params.user_id {
            q = q.bind(user_id);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
