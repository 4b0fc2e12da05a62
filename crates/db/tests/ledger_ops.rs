//! Integration tests for ledger atomic operations.
//!
//! Exercises the full repository layer against a real database:
//! - Credit idempotency (duplicate webhook absorption)
//! - Balance conservation (wallet cache vs log replay)
//! - Overdraw rejection with no partial write
//! - Hold/release reconciliation
//! - Refunds and manual adjustments

use assert_matches::assert_matches;
use centime_core::ledger::LedgerError;
use centime_db::models::ledger::{
    AdjustRequest, CreditRequest, DebitRequest, PlaceHoldRequest, RefundRequest,
    ReleaseHoldRequest,
};
use centime_db::models::transaction::TransactionQuery;
use centime_db::repositories::{LedgerRepo, TransactionRepo, WalletRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn credit(user_id: i64, amount: i64, ref_id: &str) -> CreditRequest {
    CreditRequest {
        user_id,
        amount_tokens: amount,
        source: "recharge".to_string(),
        ref_id: ref_id.to_string(),
        currency: None,
        amount_fiat_cents: None,
        meta: None,
    }
}

fn debit(user_id: i64, amount: i64) -> DebitRequest {
    DebitRequest {
        user_id,
        amount_tokens: amount,
        source: "chat_turn".to_string(),
        ref_id: None,
        provider: Some("openai".to_string()),
        model: Some("gpt-4o".to_string()),
        currency: None,
        amount_fiat_cents: None,
    }
}

fn hold(user_id: i64, amount: i64, ref_id: &str) -> PlaceHoldRequest {
    PlaceHoldRequest {
        user_id,
        amount_tokens: amount,
        ref_id: ref_id.to_string(),
        source: None,
        provider: Some("anthropic".to_string()),
        model: Some("claude-sonnet".to_string()),
    }
}

fn release(user_id: i64, hold_ref: &str, actual: i64) -> ReleaseHoldRequest {
    ReleaseHoldRequest {
        user_id,
        hold_ref_id: hold_ref.to_string(),
        actual_amount_tokens: actual,
        source: None,
        amount_fiat_cents: None,
    }
}

async fn log_count(pool: &PgPool, user_id: i64) -> usize {
    TransactionRepo::query(
        pool,
        &TransactionQuery {
            user_id: Some(user_id),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .items
    .len()
}

// ---------------------------------------------------------------------------
// Credit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn credit_creates_wallet_lazily(pool: PgPool) {
    let receipt = LedgerRepo::credit(&pool, &credit(1, 15_000, "alloc-2024-01"))
        .await
        .unwrap();

    assert_eq!(receipt.credited, 15_000);
    assert_eq!(receipt.balance, 15_000);
    assert!(!receipt.idempotent);

    let wallet = WalletRepo::find_by_user(&pool, 1).await.unwrap().unwrap();
    assert_eq!(wallet.token_balance, 15_000);
    assert_eq!(wallet.hold_amount, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_credit_ref_is_absorbed(pool: PgPool) {
    let first = LedgerRepo::credit(&pool, &credit(1, 15_000, "alloc-2024-01"))
        .await
        .unwrap();
    let second = LedgerRepo::credit(&pool, &credit(1, 15_000, "alloc-2024-01"))
        .await
        .unwrap();

    assert!(second.idempotent);
    assert_eq!(second.credited, 0);
    assert_eq!(second.balance, 15_000);
    assert_eq!(second.transaction_id, first.transaction_id);

    // Exactly one grant row committed.
    assert_eq!(log_count(&pool, 1).await, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn same_ref_for_different_users_is_independent(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 100, "shared-ref"))
        .await
        .unwrap();
    let other = LedgerRepo::credit(&pool, &credit(2, 200, "shared-ref"))
        .await
        .unwrap();

    assert!(!other.idempotent);
    assert_eq!(other.balance, 200);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn credit_stamps_balance_snapshots(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 500, "r-1")).await.unwrap();
    LedgerRepo::credit(&pool, &credit(1, 300, "r-2")).await.unwrap();

    let page = TransactionRepo::query(
        &pool,
        &TransactionQuery {
            user_id: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // Newest first: the 300-token grant on top.
    let newest = &page.items[0];
    assert_eq!(newest.meta["balance_before"], 500);
    assert_eq!(newest.meta["balance_after"], 800);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_positive_credit_is_rejected(pool: PgPool) {
    let err = LedgerRepo::credit(&pool, &credit(1, 0, "r-0")).await.unwrap_err();
    assert_matches!(err, LedgerError::InvalidAmount(_));
}

// ---------------------------------------------------------------------------
// Debit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn debit_decrements_balance(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();
    let receipt = LedgerRepo::debit(&pool, &debit(1, 400)).await.unwrap();

    assert_eq!(receipt.debited, 400);
    assert_eq!(receipt.balance, 600);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn overdraw_fails_with_no_partial_write(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 100, "r-1")).await.unwrap();
    let before = log_count(&pool, 1).await;

    let err = LedgerRepo::debit(&pool, &debit(1, 101)).await.unwrap_err();
    assert_matches!(
        err,
        LedgerError::InsufficientBalance {
            required: 101,
            spendable: 100,
        }
    );

    // Neither a ledger row nor a wallet change was committed.
    assert_eq!(log_count(&pool, 1).await, before);
    let wallet = WalletRepo::find_by_user(&pool, 1).await.unwrap().unwrap();
    assert_eq!(wallet.token_balance, 100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn credit_limit_permits_negative_balance(pool: PgPool) {
    WalletRepo::set_credit_limit(&pool, 1, 500).await.unwrap();
    LedgerRepo::credit(&pool, &credit(1, 100, "r-1")).await.unwrap();

    // 100 - 600 = -500 = exactly the credit floor.
    let receipt = LedgerRepo::debit(&pool, &debit(1, 600)).await.unwrap();
    assert_eq!(receipt.balance, -500);

    let err = LedgerRepo::debit(&pool, &debit(1, 1)).await.unwrap_err();
    assert_matches!(err, LedgerError::InsufficientBalance { .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn debit_with_ref_is_retry_safe(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();

    let mut req = debit(1, 400);
    req.ref_id = Some("turn-42".to_string());

    let first = LedgerRepo::debit(&pool, &req).await.unwrap();
    let retry = LedgerRepo::debit(&pool, &req).await.unwrap();

    assert!(!first.idempotent);
    assert!(retry.idempotent);
    assert_eq!(retry.debited, 0);
    assert_eq!(retry.balance, 600);
}

// ---------------------------------------------------------------------------
// Hold / release
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn hold_reserves_without_touching_balance(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 5000, "r-1")).await.unwrap();
    let receipt = LedgerRepo::place_hold(&pool, &hold(1, 1000, "turn-1"))
        .await
        .unwrap();

    assert_eq!(receipt.held, 1000);
    assert_eq!(receipt.hold_amount, 1000);
    assert_eq!(receipt.spendable, 4000);

    let wallet = WalletRepo::find_by_user(&pool, 1).await.unwrap().unwrap();
    assert_eq!(wallet.token_balance, 5000);
    assert_eq!(wallet.hold_amount, 1000);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_settles_actual_usage_not_reservation(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 5000, "r-1")).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 1000, "turn-1")).await.unwrap();

    let receipt = LedgerRepo::release_hold(&pool, &release(1, "turn-1", 650))
        .await
        .unwrap();

    assert_eq!(receipt.released, 1000);
    assert_eq!(receipt.settled, 650);
    assert_eq!(receipt.balance, 4350);
    assert_eq!(receipt.hold_amount, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_with_zero_actual_cancels_the_hold(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 5000, "r-1")).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 1000, "turn-1")).await.unwrap();

    let receipt = LedgerRepo::release_hold(&pool, &release(1, "turn-1", 0))
        .await
        .unwrap();

    assert_eq!(receipt.settled, 0);
    assert_eq!(receipt.balance, 5000);
    assert_eq!(receipt.hold_amount, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_settles_overuse_beyond_reservation(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 800, "turn-1")).await.unwrap();

    // The provider streamed more than reserved; the settlement still lands.
    let receipt = LedgerRepo::release_hold(&pool, &release(1, "turn-1", 950))
        .await
        .unwrap();

    assert_eq!(receipt.settled, 950);
    assert_eq!(receipt.balance, 50);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn double_release_is_absorbed(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 5000, "r-1")).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 1000, "turn-1")).await.unwrap();
    LedgerRepo::release_hold(&pool, &release(1, "turn-1", 650)).await.unwrap();

    let replay = LedgerRepo::release_hold(&pool, &release(1, "turn-1", 650))
        .await
        .unwrap();

    assert!(replay.idempotent);
    assert_eq!(replay.released, 1000);
    assert_eq!(replay.settled, 650);
    // Nothing settled twice.
    assert_eq!(replay.balance, 4350);
    assert_eq!(replay.hold_amount, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_of_unknown_hold_fails(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 5000, "r-1")).await.unwrap();

    let err = LedgerRepo::release_hold(&pool, &release(1, "no-such-turn", 100))
        .await
        .unwrap_err();
    assert_matches!(err, LedgerError::HoldNotFound { .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn hold_beyond_spendable_is_rejected(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 500, "r-1")).await.unwrap();

    let err = LedgerRepo::place_hold(&pool, &hold(1, 800, "turn-1"))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        LedgerError::InsufficientBalance {
            required: 800,
            spendable: 500,
        }
    );

    let wallet = WalletRepo::find_by_user(&pool, 1).await.unwrap().unwrap();
    assert_eq!(wallet.hold_amount, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn outstanding_holds_gate_new_holds(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 700, "turn-1")).await.unwrap();

    let err = LedgerRepo::place_hold(&pool, &hold(1, 400, "turn-2"))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        LedgerError::InsufficientBalance {
            required: 400,
            spendable: 300,
        }
    );
}

// ---------------------------------------------------------------------------
// Refund / adjust
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn refund_is_idempotent_on_ref(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();
    LedgerRepo::debit(&pool, &debit(1, 400)).await.unwrap();

    let req = RefundRequest {
        user_id: 1,
        amount_tokens: 400,
        ref_id: "refund-1".to_string(),
        reason: "provider outage mid-stream".to_string(),
        corrects_transaction_id: None,
    };
    let first = LedgerRepo::refund(&pool, &req).await.unwrap();
    let replay = LedgerRepo::refund(&pool, &req).await.unwrap();

    assert_eq!(first.balance, 1000);
    assert!(replay.idempotent);
    assert_eq!(replay.credited, 0);
    assert_eq!(replay.balance, 1000);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn adjustments_apply_signed_amounts(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();

    let down = AdjustRequest {
        user_id: 1,
        amount_tokens: -250,
        reason: "billing dispute settled".to_string(),
        actor_id: 99,
        ref_id: None,
    };
    let receipt = LedgerRepo::adjust(&pool, &down).await.unwrap();
    assert_eq!(receipt.applied, -250);
    assert_eq!(receipt.balance, 750);

    // Without a ref, a repeat is applied again, as issued.
    let receipt = LedgerRepo::adjust(&pool, &down).await.unwrap();
    assert_eq!(receipt.balance, 500);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn adjustment_with_ref_is_retry_safe(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 1000, "r-1")).await.unwrap();

    let req = AdjustRequest {
        user_id: 1,
        amount_tokens: 100,
        reason: "goodwill grant".to_string(),
        actor_id: 99,
        ref_id: Some("adj-7".to_string()),
    };
    LedgerRepo::adjust(&pool, &req).await.unwrap();
    let replay = LedgerRepo::adjust(&pool, &req).await.unwrap();

    assert!(replay.idempotent);
    assert_eq!(replay.balance, 1100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn zero_adjustment_is_rejected(pool: PgPool) {
    let err = LedgerRepo::adjust(
        &pool,
        &AdjustRequest {
            user_id: 1,
            amount_tokens: 0,
            reason: "noop".to_string(),
            actor_id: 99,
            ref_id: None,
        },
    )
    .await
    .unwrap_err();
    assert_matches!(err, LedgerError::InvalidAmount(_));
}

// ---------------------------------------------------------------------------
// Balance conservation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn wallet_balance_equals_log_replay(pool: PgPool) {
    LedgerRepo::credit(&pool, &credit(1, 10_000, "r-1")).await.unwrap();
    LedgerRepo::debit(&pool, &debit(1, 1200)).await.unwrap();
    LedgerRepo::place_hold(&pool, &hold(1, 2000, "turn-1")).await.unwrap();
    LedgerRepo::release_hold(&pool, &release(1, "turn-1", 1750)).await.unwrap();
    LedgerRepo::refund(
        &pool,
        &RefundRequest {
            user_id: 1,
            amount_tokens: 300,
            ref_id: "refund-1".to_string(),
            reason: "partial outage".to_string(),
            corrects_transaction_id: None,
        },
    )
    .await
    .unwrap();
    LedgerRepo::adjust(
        &pool,
        &AdjustRequest {
            user_id: 1,
            amount_tokens: -50,
            reason: "rounding correction".to_string(),
            actor_id: 99,
            ref_id: None,
        },
    )
    .await
    .unwrap();

    let wallet = WalletRepo::find_by_user(&pool, 1).await.unwrap().unwrap();
    let replayed = TransactionRepo::replayed_balance(&pool, 1).await.unwrap();

    assert_eq!(wallet.token_balance, 10_000 - 1200 - 1750 + 300 - 50);
    assert_eq!(wallet.token_balance, replayed);
    assert_eq!(wallet.hold_amount, 0);
}
