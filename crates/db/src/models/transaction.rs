//! Ledger transaction entity model and query types.

use centime_core::ledger::TxType;
use centime_core::types::{DbId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `ledger_transactions` table. Immutable once written.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerTransaction {
    pub id: DbId,
    pub user_id: UserId,
    pub tx_type: String,
    /// Signed per the convention in `centime_core::ledger`.
    pub amount_tokens: i64,
    pub source: String,
    pub ref_id: Option<String>,
    pub currency: Option<String>,
    pub amount_fiat_cents: Option<i64>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Always carries `balance_before` / `balance_after` snapshots.
    pub meta: serde_json::Value,
    pub created_at: Timestamp,
}

/// Insert shape used by ledger atomic units. Not exposed outside the
/// repository layer: nothing else may append to the log.
#[derive(Debug, Clone)]
pub(crate) struct NewTransaction {
    pub user_id: UserId,
    pub tx_type: TxType,
    /// Already signed per the type convention.
    pub amount_tokens: i64,
    pub source: String,
    pub ref_id: Option<String>,
    pub currency: Option<String>,
    pub amount_fiat_cents: Option<i64>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub meta: serde_json::Value,
}

/// Filter set for transaction log queries.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub user_id: Option<UserId>,
    pub tx_type: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub source: Option<String>,
    pub ref_id: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Exclusive upper bound on `id` (cursor pagination, newest first).
    pub cursor: Option<DbId>,
    pub limit: Option<i64>,
}

/// One page of the transaction log, newest first.
#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub items: Vec<LedgerTransaction>,
    /// Pass back as `cursor` to fetch the next page; `None` when exhausted.
    pub next_cursor: Option<DbId>,
}
