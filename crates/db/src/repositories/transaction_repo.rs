//! Repository for the append-only `ledger_transactions` table.
//!
//! No update or delete exists by design; corrections are modeled as new
//! refund/adjustment rows whose meta references the original entry.

use centime_core::ledger::TxType;
use centime_core::pagination::{clamp_limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use centime_core::types::{Timestamp, UserId};
use sqlx::{PgConnection, PgPool};

use crate::models::transaction::{
    LedgerTransaction, NewTransaction, TransactionPage, TransactionQuery,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, tx_type, amount_tokens, source, ref_id, \
    currency, amount_fiat_cents, provider, model, meta, created_at";

/// Provides append (ledger-internal) and query operations for the log.
pub struct TransactionRepo;

impl TransactionRepo {
    /// Insert one ledger row inside an open ledger transaction.
    ///
    /// Only callable from `LedgerRepo` atomic units, which is what keeps
    /// the wallet cache invariant intact.
    pub(crate) async fn insert(
        conn: &mut PgConnection,
        row: &NewTransaction,
    ) -> Result<LedgerTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO ledger_transactions
                (user_id, tx_type, amount_tokens, source, ref_id, currency,
                 amount_fiat_cents, provider, model, meta)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LedgerTransaction>(&query)
            .bind(row.user_id)
            .bind(row.tx_type.as_str())
            .bind(row.amount_tokens)
            .bind(&row.source)
            .bind(&row.ref_id)
            .bind(&row.currency)
            .bind(row.amount_fiat_cents)
            .bind(&row.provider)
            .bind(&row.model)
            .bind(&row.meta)
            .fetch_one(&mut *conn)
            .await
    }

    /// Find the committed transaction for an idempotency key, if any.
    pub(crate) async fn find_by_ref(
        conn: &mut PgConnection,
        user_id: UserId,
        tx_type: TxType,
        ref_id: &str,
    ) -> Result<Option<LedgerTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ledger_transactions
             WHERE user_id = $1 AND tx_type = $2 AND ref_id = $3"
        );
        sqlx::query_as::<_, LedgerTransaction>(&query)
            .bind(user_id)
            .bind(tx_type.as_str())
            .bind(ref_id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// The open hold for `(user_id, ref_id)`: a hold row with no release
    /// row for the same ref.
    pub(crate) async fn find_open_hold(
        conn: &mut PgConnection,
        user_id: UserId,
        ref_id: &str,
    ) -> Result<Option<LedgerTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ledger_transactions h
             WHERE h.user_id = $1 AND h.tx_type = 'hold' AND h.ref_id = $2
               AND NOT EXISTS (
                   SELECT 1 FROM ledger_transactions r
                   WHERE r.user_id = h.user_id
                     AND r.tx_type = 'hold_release'
                     AND r.ref_id = h.ref_id
               )"
        );
        sqlx::query_as::<_, LedgerTransaction>(&query)
            .bind(user_id)
            .bind(ref_id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Query the log with filters and cursor pagination, newest first.
    ///
    /// The cursor is a strict upper bound on `id`, so pages never drift
    /// under concurrent writes the way offset pagination does.
    pub async fn query(
        pool: &PgPool,
        params: &TransactionQuery,
    ) -> Result<TransactionPage, sqlx::Error> {
        let limit = clamp_limit(params.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT);

        let (where_clause, bind_values, bind_idx) = build_transaction_filter(params);

        let query = format!(
            "SELECT {COLUMNS} FROM ledger_transactions {where_clause} \
             ORDER BY id DESC \
             LIMIT ${bind_idx}"
        );

        let mut q = sqlx::query_as::<_, LedgerTransaction>(&query);
        for value in &bind_values {
            q = match value {
                BindValue::BigInt(v) => q.bind(v),
                BindValue::Text(v) => q.bind(v),
                BindValue::Timestamp(v) => q.bind(v),
            };
        }
        let items = q.bind(limit).fetch_all(pool).await?;

        let next_cursor = if items.len() as i64 == limit {
            items.last().map(|t| t.id)
        } else {
            None
        };

        Ok(TransactionPage { items, next_cursor })
    }

    /// Replay the log into a balance (audit path). Excludes `hold` rows,
    /// which are balance-neutral by convention.
    pub async fn replayed_balance(pool: &PgPool, user_id: UserId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_tokens), 0)::BIGINT
             FROM ledger_transactions
             WHERE user_id = $1 AND tx_type <> 'hold'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Open holds created before `cutoff`, oldest first (stale-hold
    /// reclamation sweep).
    pub async fn stale_holds(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<LedgerTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM ledger_transactions h
             WHERE h.tx_type = 'hold' AND h.created_at < $1
               AND NOT EXISTS (
                   SELECT 1 FROM ledger_transactions r
                   WHERE r.user_id = h.user_id
                     AND r.tx_type = 'hold_release'
                     AND r.ref_id = h.ref_id
               )
             ORDER BY h.created_at ASC
             LIMIT $2"
        );
        sqlx::query_as::<_, LedgerTransaction>(&query)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Total debited tokens (spends plus hold settlements) in `[from, to)`.
    pub async fn debit_total_between(
        pool: &PgPool,
        user_id: UserId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(-amount_tokens), 0)::BIGINT
             FROM ledger_transactions
             WHERE user_id = $1
               AND tx_type IN ('spend', 'hold_release')
               AND created_at >= $2 AND created_at < $3",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await
    }

    /// Users with any debit activity since `since` (spend-spike sweep
    /// candidates).
    pub async fn users_with_debits_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<UserId>, sqlx::Error> {
        sqlx::query_scalar::<_, UserId>(
            "SELECT DISTINCT user_id
             FROM ledger_transactions
             WHERE tx_type IN ('spend', 'hold_release') AND created_at >= $1",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built log queries.
enum BindValue {
    BigInt(i64),
    Text(String),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from `TransactionQuery` filters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`. The
/// `where_clause` is empty if no filters are active, or starts with
/// `WHERE `.
fn build_transaction_filter(params: &TransactionQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(user_id) = params.user_id {
        conditions.push(format!("user_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(user_id));
    }

    if let Some(ref tx_type) = params.tx_type {
        conditions.push(format!("tx_type = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(tx_type.clone()));
    }

    if let Some(ref provider) = params.provider {
        conditions.push(format!("provider = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(provider.clone()));
    }

    if let Some(ref model) = params.model {
        conditions.push(format!("model = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(model.clone()));
    }

    if let Some(ref source) = params.source {
        conditions.push(format!("source = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(source.clone()));
    }

    if let Some(ref ref_id) = params.ref_id {
        conditions.push(format!("ref_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(ref_id.clone()));
    }

    if let Some(from) = params.from {
        conditions.push(format!("created_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }

    if let Some(to) = params.to {
        conditions.push(format!("created_at <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    if let Some(cursor) = params.cursor {
        conditions.push(format!("id < ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(cursor));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}
