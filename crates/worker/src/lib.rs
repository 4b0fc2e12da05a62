//! Guardrail monitor sweep and stale-hold reclamation.
//!
//! The sweep is a stateless evaluator over recent transaction log windows
//! and current wallet states. It never mutates balances directly; the only
//! ledger writes it performs are hold expirations, which go through the
//! same `LedgerRepo::release_hold` path as everything else.

use std::time::Duration;

use centime_core::guardrail::{detect_spend_spike, AlertType};
use centime_db::models::alert::CreateAlert;
use centime_db::models::ledger::ReleaseHoldRequest;
use centime_db::repositories::{AlertRepo, LedgerRepo, TransactionRepo, WalletRepo};
use centime_db::DbPool;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Origin tag stamped on expiry-driven hold releases.
const SOURCE_HOLD_EXPIRY: &str = "hold_expiry";

/// Upper bound on holds expired per sweep pass; the remainder is picked up
/// by the next pass.
const EXPIRY_BATCH_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sweep configuration loaded from environment variables.
///
/// | Env Var                | Default |
/// |------------------------|---------|
/// | `SWEEP_INTERVAL_SECS`  | `300`   |
/// | `HOLD_TTL_SECS`        | `3600`  |
/// | `SPIKE_FACTOR`         | `2.0`   |
/// | `SPIKE_BASELINE_DAYS`  | `7`     |
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Pause between sweep passes.
    pub interval: Duration,
    /// Age after which an unreleased hold is expired with zero usage.
    pub hold_ttl: chrono::Duration,
    /// Spend-spike trigger factor.
    pub spike_factor: f64,
    /// Days of history for the spend-spike baseline.
    pub spike_baseline_days: i64,
}

impl SweepConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");

        let hold_ttl_secs: i64 = std::env::var("HOLD_TTL_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("HOLD_TTL_SECS must be a valid i64");

        let spike_factor: f64 = std::env::var("SPIKE_FACTOR")
            .unwrap_or_else(|_| centime_core::guardrail::DEFAULT_SPIKE_FACTOR.to_string())
            .parse()
            .expect("SPIKE_FACTOR must be a valid f64");

        let spike_baseline_days: i64 = std::env::var("SPIKE_BASELINE_DAYS")
            .unwrap_or_else(|_| centime_core::guardrail::DEFAULT_SPIKE_BASELINE_DAYS.to_string())
            .parse()
            .expect("SPIKE_BASELINE_DAYS must be a valid i64");

        Self {
            interval: Duration::from_secs(interval_secs),
            hold_ttl: chrono::Duration::seconds(hold_ttl_secs),
            spike_factor,
            spike_baseline_days,
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Counters from one sweep pass, logged for operators.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub spike_alerts: usize,
    pub negative_balance_alerts: usize,
    pub expired_holds: usize,
}

/// The periodic guardrail evaluator.
pub struct GuardrailSweep {
    pool: DbPool,
    config: SweepConfig,
}

impl GuardrailSweep {
    pub fn new(pool: DbPool, config: SweepConfig) -> Self {
        Self { pool, config }
    }

    /// Run sweep passes until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            hold_ttl_secs = self.config.hold_ttl.num_seconds(),
            "Guardrail sweep started"
        );
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Guardrail sweep stopping");
                    break;
                }
                () = tokio::time::sleep(self.config.interval) => {
                    match self.run_once().await {
                        Ok(report) => tracing::info!(
                            spikes = report.spike_alerts,
                            negative = report.negative_balance_alerts,
                            expired = report.expired_holds,
                            "Sweep pass complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "Sweep pass failed"),
                    }
                }
            }
        }
    }

    /// One full pass: spike scan, negative-balance scan, hold expiry.
    pub async fn run_once(&self) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();
        report.spike_alerts = self.scan_spend_spikes().await?;
        report.negative_balance_alerts = self.scan_negative_balances().await?;
        report.expired_holds = self.expire_stale_holds().await?;
        Ok(report)
    }

    /// Compare each active user's trailing-24h debits to their baseline
    /// daily average.
    async fn scan_spend_spikes(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let day_ago = now - chrono::Duration::hours(24);
        let baseline_start =
            day_ago - chrono::Duration::days(self.config.spike_baseline_days);

        let mut raised = 0;
        let users = TransactionRepo::users_with_debits_since(&self.pool, day_ago).await?;
        for user_id in users {
            let total_24h =
                TransactionRepo::debit_total_between(&self.pool, user_id, day_ago, now).await?;
            let baseline_total =
                TransactionRepo::debit_total_between(&self.pool, user_id, baseline_start, day_ago)
                    .await?;

            let Some(finding) = detect_spend_spike(
                total_24h,
                baseline_total,
                self.config.spike_baseline_days,
                self.config.spike_factor,
            ) else {
                continue;
            };

            let alert = CreateAlert::new(
                AlertType::SpendSpike,
                Some(user_id),
                serde_json::json!({
                    "total_24h": finding.total_24h,
                    "avg_daily": finding.avg_daily,
                    "delta_pct": finding.delta_pct,
                }),
            );
            if AlertRepo::emit(&self.pool, &alert).await?.is_some() {
                raised += 1;
            }
        }
        Ok(raised)
    }

    /// Flag wallets observed below zero. Permitted within the credit
    /// limit, but always worth an operator's look.
    async fn scan_negative_balances(&self) -> anyhow::Result<usize> {
        let mut raised = 0;
        for wallet in WalletRepo::list_negative_balances(&self.pool).await? {
            let alert = CreateAlert::new(
                AlertType::NegativeBalance,
                Some(wallet.user_id),
                serde_json::json!({ "balance": wallet.token_balance }),
            );
            if AlertRepo::emit(&self.pool, &alert).await?.is_some() {
                raised += 1;
            }
        }
        Ok(raised)
    }

    /// Release holds older than the TTL with zero usage.
    ///
    /// A hold can outlive its request (client disconnects mid-stream); the
    /// TTL bounds how long reserved tokens can leak.
    async fn expire_stale_holds(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - self.config.hold_ttl;
        let stale = TransactionRepo::stale_holds(&self.pool, cutoff, EXPIRY_BATCH_LIMIT).await?;

        let mut expired = 0;
        for hold in stale {
            let Some(ref_id) = hold.ref_id.clone() else {
                continue;
            };
            let req = ReleaseHoldRequest {
                user_id: hold.user_id,
                hold_ref_id: ref_id.clone(),
                actual_amount_tokens: 0,
                source: Some(SOURCE_HOLD_EXPIRY.to_string()),
                amount_fiat_cents: None,
            };
            match LedgerRepo::release_hold(&self.pool, &req).await {
                Ok(_) => {
                    tracing::warn!(
                        user_id = hold.user_id,
                        ref_id = %ref_id,
                        held = hold.amount_tokens,
                        "Expired stale hold"
                    );
                    expired += 1;
                }
                Err(e) => {
                    tracing::error!(
                        user_id = hold.user_id,
                        ref_id = %ref_id,
                        error = %e,
                        "Failed to expire stale hold"
                    );
                }
            }
        }
        Ok(expired)
    }
}
