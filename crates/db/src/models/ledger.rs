//! Request DTOs for ledger operations.
//!
//! These are the narrow API contract of the billing core: the payment
//! webhook handler, the generation pipeline, and the admin surface all
//! speak these shapes.

use centime_core::types::UserId;
use serde::Deserialize;

/// Credit a wallet (recharge, plan allocation, admin grant).
///
/// Idempotent on `(user_id, ref_id)`: replays of the same webhook are
/// absorbed without a second credit.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditRequest {
    pub user_id: UserId,
    pub amount_tokens: i64,
    /// Origin tag, e.g. `recharge`, `plan_allocation`.
    pub source: String,
    /// Caller idempotency key, e.g. the payment provider's transaction id.
    pub ref_id: String,
    pub currency: Option<String>,
    pub amount_fiat_cents: Option<i64>,
    pub meta: Option<serde_json::Value>,
}

/// Debit a wallet for a known-cost operation.
#[derive(Debug, Clone, Deserialize)]
pub struct DebitRequest {
    pub user_id: UserId,
    pub amount_tokens: i64,
    pub source: String,
    /// Optional idempotency key for retry-safe debits.
    pub ref_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub currency: Option<String>,
    pub amount_fiat_cents: Option<i64>,
}

/// Reserve tokens ahead of an uncertain-cost operation (e.g. a streaming
/// generation call whose final token count is unknown).
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceHoldRequest {
    pub user_id: UserId,
    pub amount_tokens: i64,
    /// Required: the release is addressed by this ref.
    pub ref_id: String,
    pub source: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Settle a hold with the actual usage. `actual_amount_tokens = 0` cancels.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseHoldRequest {
    pub user_id: UserId,
    pub hold_ref_id: String,
    pub actual_amount_tokens: i64,
    /// Defaults to the hold's own source tag when omitted.
    pub source: Option<String>,
    pub amount_fiat_cents: Option<i64>,
}

/// Return tokens to a wallet; symmetric to a credit but tagged distinctly
/// for reporting. Same idempotency rule as credits.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub user_id: UserId,
    pub amount_tokens: i64,
    pub ref_id: String,
    pub reason: String,
    /// Ledger id of the transaction being corrected, if any.
    pub corrects_transaction_id: Option<i64>,
}

/// Manual operator correction. Signed either way; never auto-deduplicated,
/// but supplying a `ref_id` makes a retry safe.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustRequest {
    pub user_id: UserId,
    pub amount_tokens: i64,
    pub reason: String,
    pub actor_id: UserId,
    pub ref_id: Option<String>,
}
