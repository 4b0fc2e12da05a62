//! Wallet entity model and read DTOs.

use centime_core::ledger::spendable;
use centime_core::types::{DbId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `wallets` table.
///
/// A cache over the transaction log, never an independent source of truth;
/// see `RebuildCheck` for the audit that verifies the invariant.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub id: DbId,
    pub user_id: UserId,
    pub token_balance: i64,
    pub hold_amount: i64,
    pub credit_limit: i64,
    pub currency: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Balance snapshot returned by read endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    pub user_id: UserId,
    pub token_balance: i64,
    pub hold_amount: i64,
    pub credit_limit: i64,
    pub spendable: i64,
    pub currency: String,
}

impl From<&Wallet> for BalanceSnapshot {
    fn from(w: &Wallet) -> Self {
        Self {
            user_id: w.user_id,
            token_balance: w.token_balance,
            hold_amount: w.hold_amount,
            credit_limit: w.credit_limit,
            spendable: spendable(w.token_balance, w.hold_amount, w.credit_limit),
            currency: w.currency.clone(),
        }
    }
}

/// Result of replaying the log against the cached wallet row.
#[derive(Debug, Serialize)]
pub struct RebuildCheck {
    pub user_id: UserId,
    pub cached_balance: i64,
    pub replayed_balance: i64,
    pub consistent: bool,
}
