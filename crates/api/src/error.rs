use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use centime_core::error::CoreError;
use centime_core::ledger::LedgerError;
use centime_core::pricing::PricingError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the typed domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses
/// with a stable machine-readable `code`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A generic domain error from `centime_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A typed ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A typed pricing failure.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// A database error from sqlx (read paths that bypass the typed enums).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A single request's required tokens exceed the per-turn cap.
    #[error("Per-turn token cap exceeded: required {required}")]
    TurnCapExceeded { required: i64 },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- LedgerError variants ---
            AppError::Ledger(ledger) => match ledger {
                LedgerError::InsufficientBalance { required, spendable } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "INSUFFICIENT_BALANCE",
                    format!("Insufficient balance: required {required}, spendable {spendable}"),
                ),
                LedgerError::HoldNotFound { ref_id } => (
                    StatusCode::NOT_FOUND,
                    "HOLD_NOT_FOUND",
                    format!("No open hold with ref '{ref_id}'"),
                ),
                LedgerError::InvalidAmount(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_AMOUNT", msg.clone())
                }
                LedgerError::Unavailable(msg) => {
                    tracing::error!(error = %msg, "Ledger unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "LEDGER_UNAVAILABLE",
                        "The ledger is temporarily unavailable".to_string(),
                    )
                }
            },

            // --- PricingError variants ---
            AppError::Pricing(pricing) => match pricing {
                PricingError::NoPriceForWindow { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "NO_PRICE_FOR_WINDOW",
                    pricing.to_string(),
                ),
                PricingError::OverlappingWindow { .. } => (
                    StatusCode::CONFLICT,
                    "OVERLAPPING_PRICING_WINDOW",
                    pricing.to_string(),
                ),
                PricingError::InvalidWindow(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_WINDOW", msg.clone())
                }
                PricingError::Unavailable(msg) => {
                    tracing::error!(error = %msg, "Pricing unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "PRICING_UNAVAILABLE",
                        "Pricing is temporarily unavailable".to_string(),
                    )
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::TurnCapExceeded { required } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CAP_EXCEEDED",
                format!("Request requires {required} tokens, above the per-turn cap"),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
