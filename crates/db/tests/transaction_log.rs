//! Integration tests for transaction log queries: filters, cursor
//! pagination, replay sums, and open-hold lookups.

use centime_db::models::ledger::{CreditRequest, DebitRequest, PlaceHoldRequest, ReleaseHoldRequest};
use centime_db::models::transaction::TransactionQuery;
use centime_db::repositories::{LedgerRepo, TransactionRepo};
use chrono::{Duration, Utc};
use sqlx::PgPool;

async fn seed_user(pool: &PgPool, user_id: i64) {
    LedgerRepo::credit(
        pool,
        &CreditRequest {
            user_id,
            amount_tokens: 10_000,
            source: "plan_allocation".to_string(),
            ref_id: format!("alloc-{user_id}"),
            currency: None,
            amount_fiat_cents: None,
            meta: None,
        },
    )
    .await
    .unwrap();
}

async fn spend(pool: &PgPool, user_id: i64, amount: i64, provider: &str) {
    LedgerRepo::debit(
        pool,
        &DebitRequest {
            user_id,
            amount_tokens: amount,
            source: "chat_turn".to_string(),
            ref_id: None,
            provider: Some(provider.to_string()),
            model: Some("default".to_string()),
            currency: None,
            amount_fiat_cents: None,
        },
    )
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn filters_compose(pool: PgPool) {
    seed_user(&pool, 1).await;
    seed_user(&pool, 2).await;
    spend(&pool, 1, 100, "openai").await;
    spend(&pool, 1, 200, "anthropic").await;
    spend(&pool, 2, 300, "openai").await;

    let page = TransactionRepo::query(
        &pool,
        &TransactionQuery {
            user_id: Some(1),
            tx_type: Some("spend".to_string()),
            provider: Some("openai".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].amount_tokens, -100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cursor_pages_never_repeat_rows(pool: PgPool) {
    seed_user(&pool, 1).await;
    for _ in 0..5 {
        spend(&pool, 1, 10, "openai").await;
    }

    // 6 rows total (1 grant + 5 spends), pages of 2, newest first.
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = TransactionRepo::query(
            &pool,
            &TransactionQuery {
                user_id: Some(1),
                cursor,
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        seen.extend(page.items.iter().map(|t| t.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 6);
    // Strictly descending: no duplicates, no drift.
    assert!(seen.windows(2).all(|w| w[0] > w[1]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn time_range_filter_bounds_results(pool: PgPool) {
    seed_user(&pool, 1).await;
    spend(&pool, 1, 100, "openai").await;

    let future = Utc::now() + Duration::hours(1);
    let page = TransactionRepo::query(
        &pool,
        &TransactionQuery {
            user_id: Some(1),
            from: Some(future),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(page.items.is_empty());

    let page = TransactionRepo::query(
        &pool,
        &TransactionQuery {
            user_id: Some(1),
            to: Some(future),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replayed_balance_excludes_hold_rows(pool: PgPool) {
    seed_user(&pool, 1).await;
    LedgerRepo::place_hold(
        &pool,
        &PlaceHoldRequest {
            user_id: 1,
            amount_tokens: 2000,
            ref_id: "turn-1".to_string(),
            source: None,
            provider: None,
            model: None,
        },
    )
    .await
    .unwrap();

    // The open hold reserves tokens but does not move the balance.
    let replayed = TransactionRepo::replayed_balance(&pool, 1).await.unwrap();
    assert_eq!(replayed, 10_000);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_holds_surface_until_released(pool: PgPool) {
    seed_user(&pool, 1).await;
    LedgerRepo::place_hold(
        &pool,
        &PlaceHoldRequest {
            user_id: 1,
            amount_tokens: 500,
            ref_id: "turn-orphan".to_string(),
            source: None,
            provider: None,
            model: None,
        },
    )
    .await
    .unwrap();

    // A cutoff in the future sees the hold as stale.
    let cutoff = Utc::now() + Duration::seconds(5);
    let stale = TransactionRepo::stale_holds(&pool, cutoff, 10).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].ref_id.as_deref(), Some("turn-orphan"));

    LedgerRepo::release_hold(
        &pool,
        &ReleaseHoldRequest {
            user_id: 1,
            hold_ref_id: "turn-orphan".to_string(),
            actual_amount_tokens: 0,
            source: None,
            amount_fiat_cents: None,
        },
    )
    .await
    .unwrap();

    let stale = TransactionRepo::stale_holds(&pool, cutoff, 10).await.unwrap();
    assert!(stale.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn debit_totals_cover_spends_and_settlements(pool: PgPool) {
    seed_user(&pool, 1).await;
    spend(&pool, 1, 100, "openai").await;
    LedgerRepo::place_hold(
        &pool,
        &PlaceHoldRequest {
            user_id: 1,
            amount_tokens: 500,
            ref_id: "turn-1".to_string(),
            source: None,
            provider: None,
            model: None,
        },
    )
    .await
    .unwrap();
    LedgerRepo::release_hold(
        &pool,
        &ReleaseHoldRequest {
            user_id: 1,
            hold_ref_id: "turn-1".to_string(),
            actual_amount_tokens: 350,
            source: None,
            amount_fiat_cents: None,
        },
    )
    .await
    .unwrap();

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let total = TransactionRepo::debit_total_between(&pool, 1, from, to)
        .await
        .unwrap();
    assert_eq!(total, 450);

    let users = TransactionRepo::users_with_debits_since(&pool, from)
        .await
        .unwrap();
    assert_eq!(users, vec![1]);
}
