//! Repository for the `wallets` table.
//!
//! Balance and hold counters are only ever written through
//! [`crate::repositories::LedgerRepo`] atomic units; the `pub(crate)`
//! methods here are the primitives those units are built from.

use centime_core::types::{DbId, UserId};
use sqlx::{PgConnection, PgPool};

use crate::models::wallet::{BalanceSnapshot, Wallet};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, token_balance, hold_amount, credit_limit, \
    currency, created_at, updated_at";

/// Provides read access and the locked write primitives for wallets.
pub struct WalletRepo;

impl WalletRepo {
    /// Find a wallet by its owning user.
    pub async fn find_by_user(pool: &PgPool, user_id: UserId) -> Result<Option<Wallet>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM wallets WHERE user_id = $1");
        sqlx::query_as::<_, Wallet>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Balance snapshot for read endpoints; `None` if the user has no
    /// wallet yet (no ledger activity).
    pub async fn read_balance(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Option<BalanceSnapshot>, sqlx::Error> {
        Ok(Self::find_by_user(pool, user_id)
            .await?
            .map(|w| BalanceSnapshot::from(&w)))
    }

    /// Set a user's credit limit (plan policy / admin entry point).
    ///
    /// Upserts so a limit can be configured before the first credit
    /// creates ledger activity.
    pub async fn set_credit_limit(
        pool: &PgPool,
        user_id: UserId,
        credit_limit: i64,
    ) -> Result<Wallet, sqlx::Error> {
        let query = format!(
            "INSERT INTO wallets (user_id, credit_limit) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET
                credit_limit = EXCLUDED.credit_limit,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Wallet>(&query)
            .bind(user_id)
            .bind(credit_limit)
            .fetch_one(pool)
            .await
    }

    /// Wallets currently below zero (guardrail sweep input), most negative
    /// first.
    pub async fn list_negative_balances(pool: &PgPool) -> Result<Vec<Wallet>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM wallets
             WHERE token_balance < 0
             ORDER BY token_balance ASC"
        );
        sqlx::query_as::<_, Wallet>(&query).fetch_all(pool).await
    }

    /// Lock (and lazily create) the wallet row for `user_id`.
    ///
    /// All ledger mutations for a user serialize on this row lock, which
    /// is what makes read-compute-write inside the surrounding transaction
    /// safe against lost updates.
    pub(crate) async fn lock_or_create(
        conn: &mut PgConnection,
        user_id: UserId,
    ) -> Result<Wallet, sqlx::Error> {
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        let query = format!("SELECT {COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE");
        sqlx::query_as::<_, Wallet>(&query)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
    }

    /// Apply balance/hold deltas to a wallet row locked by the caller.
    pub(crate) async fn apply_deltas(
        conn: &mut PgConnection,
        wallet_id: DbId,
        balance_delta: i64,
        hold_delta: i64,
    ) -> Result<Wallet, sqlx::Error> {
        let query = format!(
            "UPDATE wallets SET
                token_balance = token_balance + $2,
                hold_amount = hold_amount + $3,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Wallet>(&query)
            .bind(wallet_id)
            .bind(balance_delta)
            .bind(hold_delta)
            .fetch_one(&mut *conn)
            .await
    }
}
