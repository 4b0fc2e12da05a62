//! Atomic ledger operations: credit, debit, hold, release, refund, adjust.
//!
//! Every mutating operation runs as one Postgres transaction that
//! row-locks the wallet, inserts exactly one ledger row with
//! balance-before/after snapshots stamped into its meta, and updates the
//! wallet counters. Writers for the same user serialize on the row lock;
//! cross-user operations never contend. If the transaction aborts, neither
//! the ledger row nor the wallet update is visible.
//!
//! Serialization failures and deadlocks are retried a bounded number of
//! times, then surfaced as [`LedgerError::Unavailable`]. Domain failures
//! (insufficient balance, invalid amounts) are never retried.

use std::time::Duration;

use centime_core::ledger::{
    self, AdjustReceipt, CreditReceipt, DebitReceipt, HoldReceipt, LedgerError, ReleaseReceipt,
    TxType,
};
use centime_core::types::UserId;
use sqlx::PgPool;

use crate::models::ledger::{
    AdjustRequest, CreditRequest, DebitRequest, PlaceHoldRequest, RefundRequest,
    ReleaseHoldRequest,
};
use crate::models::transaction::{LedgerTransaction, NewTransaction};
use crate::models::wallet::Wallet;
use crate::repositories::{TransactionRepo, WalletRepo};

/// Attempts per operation before surfacing `Unavailable`.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; grows linearly.
const RETRY_BACKOFF_MS: u64 = 50;

/// Origin tag stamped on adjustment rows.
const SOURCE_ADJUSTMENT: &str = "admin_adjustment";

/// Default origin tag for holds when the caller supplies none.
const SOURCE_CHAT_TURN: &str = "chat_turn";

/// Meta key on release rows: the originally reserved hold amount.
const META_RELEASED_HOLD: &str = "released_hold";

// ---------------------------------------------------------------------------
// Internal error plumbing
// ---------------------------------------------------------------------------

/// Domain failures end the operation immediately; storage failures may be
/// retried by the outer loop.
enum OpError {
    Domain(LedgerError),
    Storage(sqlx::Error),
}

impl From<sqlx::Error> for OpError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e)
    }
}

impl From<LedgerError> for OpError {
    fn from(e: LedgerError) -> Self {
        Self::Domain(e)
    }
}

type OpResult<T> = Result<T, OpError>;

/// Postgres serialization failure (40001) or deadlock (40P01).
fn is_retryable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
    )
}

/// Violation of the `(user_id, tx_type, ref_id)` idempotency index.
fn is_duplicate_ref(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505")
                && db.constraint() == Some("uq_ledger_transactions_user_type_ref")
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// LedgerRepo
// ---------------------------------------------------------------------------

/// The single write path for wallets and the transaction log.
pub struct LedgerRepo;

impl LedgerRepo {
    /// Credit a wallet. Idempotent on `(user_id, ref_id)`: a replay
    /// returns the original transaction with `credited = 0`.
    pub async fn credit(pool: &PgPool, req: &CreditRequest) -> Result<CreditReceipt, LedgerError> {
        ledger::check_positive(req.amount_tokens, "credit")?;
        Self::run("credit", || Self::credit_once(pool, req)).await
    }

    /// Debit a wallet for a known cost. Fails with `InsufficientBalance`
    /// when the result would drop below `-credit_limit`.
    pub async fn debit(pool: &PgPool, req: &DebitRequest) -> Result<DebitReceipt, LedgerError> {
        ledger::check_positive(req.amount_tokens, "debit")?;
        Self::run("debit", || Self::debit_once(pool, req)).await
    }

    /// Reserve tokens ahead of an uncertain-cost operation. Raises
    /// `hold_amount`; the balance is untouched until release.
    pub async fn place_hold(
        pool: &PgPool,
        req: &PlaceHoldRequest,
    ) -> Result<HoldReceipt, LedgerError> {
        ledger::check_positive(req.amount_tokens, "hold")?;
        Self::run("place_hold", || Self::place_hold_once(pool, req)).await
    }

    /// Settle a hold with the actual usage. Under- and over-usage both
    /// settle here; `actual_amount_tokens = 0` cancels the hold.
    ///
    /// A hold settlement is never rejected for balance: the reservation
    /// was the pessimistic gate, and tokens already streamed to the user
    /// must be billed even if the provider overshot the reserve.
    pub async fn release_hold(
        pool: &PgPool,
        req: &ReleaseHoldRequest,
    ) -> Result<ReleaseReceipt, LedgerError> {
        ledger::check_non_negative(req.actual_amount_tokens, "release")?;
        Self::run("release_hold", || Self::release_hold_once(pool, req)).await
    }

    /// Return tokens to a wallet. Same idempotency rule as credits,
    /// tagged `refund` for reporting.
    pub async fn refund(pool: &PgPool, req: &RefundRequest) -> Result<CreditReceipt, LedgerError> {
        ledger::check_positive(req.amount_tokens, "refund")?;
        Self::run("refund", || Self::refund_once(pool, req)).await
    }

    /// Manual operator correction, signed either way. Deduplicated only
    /// when the caller supplies a `ref_id`; repeated adjustments without
    /// one are applied as issued.
    pub async fn adjust(pool: &PgPool, req: &AdjustRequest) -> Result<AdjustReceipt, LedgerError> {
        ledger::check_nonzero(req.amount_tokens)?;
        Self::run("adjust", || Self::adjust_once(pool, req)).await
    }

    // -- Retry loop -----------------------------------------------------

    async fn run<T, F, Fut>(op: &'static str, mut f: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = OpResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(OpError::Domain(e)) => return Err(e),
                Err(OpError::Storage(e)) if is_retryable(&e) && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(op, attempt, error = %e, "Ledger write conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(OpError::Storage(e)) => {
                    tracing::error!(op, error = %e, "Ledger operation failed");
                    return Err(LedgerError::Unavailable(e.to_string()));
                }
            }
        }
    }

    // -- Single attempts ------------------------------------------------

    async fn credit_once(pool: &PgPool, req: &CreditRequest) -> OpResult<CreditReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(existing) =
            TransactionRepo::find_by_ref(&mut tx, req.user_id, TxType::Grant, &req.ref_id).await?
        {
            tx.commit().await?;
            tracing::info!(
                user_id = req.user_id,
                ref_id = %req.ref_id,
                "Duplicate credit ref absorbed"
            );
            return Ok(CreditReceipt {
                transaction_id: existing.id,
                credited: 0,
                balance: wallet.token_balance,
                idempotent: true,
            });
        }

        let balance_after = wallet.token_balance + req.amount_tokens;
        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::Grant,
            amount_tokens: ledger::signed_amount(TxType::Grant, req.amount_tokens),
            source: req.source.clone(),
            ref_id: Some(req.ref_id.clone()),
            currency: req.currency.clone(),
            amount_fiat_cents: req.amount_fiat_cents,
            provider: None,
            model: None,
            meta: ledger::stamp_balance_meta(req.meta.clone(), wallet.token_balance, balance_after),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                // Lost a cross-connection race; the unique index is the
                // backstop that makes check-then-insert safe.
                drop(tx);
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::Grant, &req.ref_id).await?;
                return Ok(CreditReceipt {
                    transaction_id: existing.id,
                    credited: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let updated = WalletRepo::apply_deltas(&mut tx, wallet.id, req.amount_tokens, 0).await?;
        tx.commit().await?;

        tracing::debug!(
            user_id = req.user_id,
            amount = req.amount_tokens,
            balance = updated.token_balance,
            "Wallet credited"
        );
        Ok(CreditReceipt {
            transaction_id: inserted.id,
            credited: req.amount_tokens,
            balance: updated.token_balance,
            idempotent: false,
        })
    }

    async fn debit_once(pool: &PgPool, req: &DebitRequest) -> OpResult<DebitReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(ref ref_id) = req.ref_id {
            if let Some(existing) =
                TransactionRepo::find_by_ref(&mut tx, req.user_id, TxType::Spend, ref_id).await?
            {
                tx.commit().await?;
                return Ok(DebitReceipt {
                    transaction_id: existing.id,
                    debited: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
        }

        ledger::check_debit(wallet.token_balance, wallet.credit_limit, req.amount_tokens)?;

        let balance_after = wallet.token_balance - req.amount_tokens;
        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::Spend,
            amount_tokens: ledger::signed_amount(TxType::Spend, req.amount_tokens),
            source: req.source.clone(),
            ref_id: req.ref_id.clone(),
            currency: req.currency.clone(),
            amount_fiat_cents: req.amount_fiat_cents,
            provider: req.provider.clone(),
            model: req.model.clone(),
            meta: ledger::stamp_balance_meta(None, wallet.token_balance, balance_after),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                drop(tx);
                let ref_id = req.ref_id.as_deref().unwrap_or_default();
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::Spend, ref_id).await?;
                return Ok(DebitReceipt {
                    transaction_id: existing.id,
                    debited: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let updated =
            WalletRepo::apply_deltas(&mut tx, wallet.id, -req.amount_tokens, 0).await?;
        tx.commit().await?;

        tracing::debug!(
            user_id = req.user_id,
            amount = req.amount_tokens,
            balance = updated.token_balance,
            "Wallet debited"
        );
        Ok(DebitReceipt {
            transaction_id: inserted.id,
            debited: req.amount_tokens,
            balance: updated.token_balance,
            idempotent: false,
        })
    }

    async fn place_hold_once(pool: &PgPool, req: &PlaceHoldRequest) -> OpResult<HoldReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(existing) =
            TransactionRepo::find_by_ref(&mut tx, req.user_id, TxType::Hold, &req.ref_id).await?
        {
            tx.commit().await?;
            return Ok(HoldReceipt {
                transaction_id: existing.id,
                held: 0,
                hold_amount: wallet.hold_amount,
                spendable: ledger::spendable(
                    wallet.token_balance,
                    wallet.hold_amount,
                    wallet.credit_limit,
                ),
                idempotent: true,
            });
        }

        ledger::check_hold(
            wallet.token_balance,
            wallet.hold_amount,
            wallet.credit_limit,
            req.amount_tokens,
        )?;

        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::Hold,
            amount_tokens: ledger::signed_amount(TxType::Hold, req.amount_tokens),
            source: req
                .source
                .clone()
                .unwrap_or_else(|| SOURCE_CHAT_TURN.to_string()),
            ref_id: Some(req.ref_id.clone()),
            currency: None,
            amount_fiat_cents: None,
            provider: req.provider.clone(),
            model: req.model.clone(),
            // Holds are balance-neutral: both snapshots are the current balance.
            meta: ledger::stamp_balance_meta(None, wallet.token_balance, wallet.token_balance),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                drop(tx);
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::Hold, &req.ref_id).await?;
                return Ok(HoldReceipt {
                    transaction_id: existing.id,
                    held: 0,
                    hold_amount: wallet.hold_amount,
                    spendable: ledger::spendable(
                        wallet.token_balance,
                        wallet.hold_amount,
                        wallet.credit_limit,
                    ),
                    idempotent: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let updated = WalletRepo::apply_deltas(&mut tx, wallet.id, 0, req.amount_tokens).await?;
        tx.commit().await?;

        tracing::debug!(
            user_id = req.user_id,
            amount = req.amount_tokens,
            hold_amount = updated.hold_amount,
            "Hold placed"
        );
        Ok(HoldReceipt {
            transaction_id: inserted.id,
            held: req.amount_tokens,
            hold_amount: updated.hold_amount,
            spendable: ledger::spendable(
                updated.token_balance,
                updated.hold_amount,
                updated.credit_limit,
            ),
            idempotent: false,
        })
    }

    async fn release_hold_once(
        pool: &PgPool,
        req: &ReleaseHoldRequest,
    ) -> OpResult<ReleaseReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(existing) = TransactionRepo::find_by_ref(
            &mut tx,
            req.user_id,
            TxType::HoldRelease,
            &req.hold_ref_id,
        )
        .await?
        {
            tx.commit().await?;
            return Ok(Self::release_replay(&existing, &wallet));
        }

        let Some(hold) =
            TransactionRepo::find_open_hold(&mut tx, req.user_id, &req.hold_ref_id).await?
        else {
            return Err(LedgerError::HoldNotFound {
                ref_id: req.hold_ref_id.clone(),
            }
            .into());
        };

        let reserved = hold.amount_tokens;
        let actual = req.actual_amount_tokens;
        let balance_after = wallet.token_balance - actual;

        let caller_meta = serde_json::json!({
            META_RELEASED_HOLD: reserved,
            "hold_transaction_id": hold.id,
        });
        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::HoldRelease,
            amount_tokens: ledger::signed_amount(TxType::HoldRelease, actual),
            source: req.source.clone().unwrap_or_else(|| hold.source.clone()),
            ref_id: Some(req.hold_ref_id.clone()),
            currency: None,
            amount_fiat_cents: req.amount_fiat_cents,
            provider: hold.provider.clone(),
            model: hold.model.clone(),
            meta: ledger::stamp_balance_meta(
                Some(caller_meta),
                wallet.token_balance,
                balance_after,
            ),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                drop(tx);
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::HoldRelease, &req.hold_ref_id)
                        .await?;
                return Ok(Self::release_replay(&existing, &wallet));
            }
            Err(e) => return Err(e.into()),
        };

        let updated = WalletRepo::apply_deltas(&mut tx, wallet.id, -actual, -reserved).await?;
        tx.commit().await?;

        tracing::debug!(
            user_id = req.user_id,
            reserved,
            settled = actual,
            balance = updated.token_balance,
            "Hold released"
        );
        Ok(ReleaseReceipt {
            transaction_id: inserted.id,
            released: reserved,
            settled: actual,
            balance: updated.token_balance,
            hold_amount: updated.hold_amount,
            idempotent: false,
        })
    }

    async fn refund_once(pool: &PgPool, req: &RefundRequest) -> OpResult<CreditReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(existing) =
            TransactionRepo::find_by_ref(&mut tx, req.user_id, TxType::Refund, &req.ref_id).await?
        {
            tx.commit().await?;
            return Ok(CreditReceipt {
                transaction_id: existing.id,
                credited: 0,
                balance: wallet.token_balance,
                idempotent: true,
            });
        }

        let balance_after = wallet.token_balance + req.amount_tokens;
        let caller_meta = serde_json::json!({
            "reason": req.reason,
            "corrects_transaction_id": req.corrects_transaction_id,
        });
        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::Refund,
            amount_tokens: ledger::signed_amount(TxType::Refund, req.amount_tokens),
            source: "refund".to_string(),
            ref_id: Some(req.ref_id.clone()),
            currency: None,
            amount_fiat_cents: None,
            provider: None,
            model: None,
            meta: ledger::stamp_balance_meta(
                Some(caller_meta),
                wallet.token_balance,
                balance_after,
            ),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                drop(tx);
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::Refund, &req.ref_id).await?;
                return Ok(CreditReceipt {
                    transaction_id: existing.id,
                    credited: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let updated = WalletRepo::apply_deltas(&mut tx, wallet.id, req.amount_tokens, 0).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = req.user_id,
            amount = req.amount_tokens,
            reason = %req.reason,
            "Wallet refunded"
        );
        Ok(CreditReceipt {
            transaction_id: inserted.id,
            credited: req.amount_tokens,
            balance: updated.token_balance,
            idempotent: false,
        })
    }

    async fn adjust_once(pool: &PgPool, req: &AdjustRequest) -> OpResult<AdjustReceipt> {
        let mut tx = pool.begin().await?;
        let wallet = WalletRepo::lock_or_create(&mut tx, req.user_id).await?;

        if let Some(ref ref_id) = req.ref_id {
            if let Some(existing) =
                TransactionRepo::find_by_ref(&mut tx, req.user_id, TxType::Adjustment, ref_id)
                    .await?
            {
                tx.commit().await?;
                return Ok(AdjustReceipt {
                    transaction_id: existing.id,
                    applied: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
        }

        // No overdraw check: operator corrections may intentionally push a
        // wallet negative. The guardrail sweep flags the result.
        let balance_after = wallet.token_balance + req.amount_tokens;
        let caller_meta = serde_json::json!({
            "reason": req.reason,
            "actor_id": req.actor_id,
        });
        let row = NewTransaction {
            user_id: req.user_id,
            tx_type: TxType::Adjustment,
            amount_tokens: ledger::signed_amount(TxType::Adjustment, req.amount_tokens),
            source: SOURCE_ADJUSTMENT.to_string(),
            ref_id: req.ref_id.clone(),
            currency: None,
            amount_fiat_cents: None,
            provider: None,
            model: None,
            meta: ledger::stamp_balance_meta(
                Some(caller_meta),
                wallet.token_balance,
                balance_after,
            ),
        };

        let inserted = match TransactionRepo::insert(&mut tx, &row).await {
            Ok(t) => t,
            Err(e) if is_duplicate_ref(&e) => {
                drop(tx);
                let ref_id = req.ref_id.as_deref().unwrap_or_default();
                let (existing, wallet) =
                    Self::replayed(pool, req.user_id, TxType::Adjustment, ref_id).await?;
                return Ok(AdjustReceipt {
                    transaction_id: existing.id,
                    applied: 0,
                    balance: wallet.token_balance,
                    idempotent: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let updated = WalletRepo::apply_deltas(&mut tx, wallet.id, req.amount_tokens, 0).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = req.user_id,
            amount = req.amount_tokens,
            actor_id = req.actor_id,
            reason = %req.reason,
            "Wallet adjusted"
        );
        Ok(AdjustReceipt {
            transaction_id: inserted.id,
            applied: req.amount_tokens,
            balance: updated.token_balance,
            idempotent: false,
        })
    }

    // -- Replay reconstruction ------------------------------------------

    /// Fetch the committed transaction and current wallet after a
    /// duplicate-ref constraint violation rolled back the attempt.
    async fn replayed(
        pool: &PgPool,
        user_id: UserId,
        tx_type: TxType,
        ref_id: &str,
    ) -> OpResult<(LedgerTransaction, Wallet)> {
        let mut conn = pool.acquire().await?;
        let Some(existing) =
            TransactionRepo::find_by_ref(&mut conn, user_id, tx_type, ref_id).await?
        else {
            return Err(sqlx::Error::RowNotFound.into());
        };
        let Some(wallet) = WalletRepo::find_by_user(pool, user_id).await? else {
            return Err(sqlx::Error::RowNotFound.into());
        };
        Ok((existing, wallet))
    }

    /// Rebuild a release receipt from a committed release row.
    fn release_replay(existing: &LedgerTransaction, wallet: &Wallet) -> ReleaseReceipt {
        let released = existing
            .meta
            .get(META_RELEASED_HOLD)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        ReleaseReceipt {
            transaction_id: existing.id,
            released,
            settled: -existing.amount_tokens,
            balance: wallet.token_balance,
            hold_amount: wallet.hold_amount,
            idempotent: true,
        }
    }
}
