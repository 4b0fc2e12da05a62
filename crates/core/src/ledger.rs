//! Ledger domain types, sign conventions, and balance arithmetic.
//!
//! The transaction log is append-only; these helpers fix the sign
//! convention per transaction type and centralize the overdraw checks so
//! the repository layer never re-derives them inline.
//!
//! Sign convention (applied uniformly at write time):
//! - `grant`, `refund`: positive.
//! - `adjustment`: signed, nonzero, passed through as supplied.
//! - `spend`, `hold_release`: stored negative (magnitude = tokens settled).
//! - `hold`: positive magnitude of the reservation, but balance-neutral:
//!   excluded from the balance sum, it drives `hold_amount` only.
//!
//! With that convention, a wallet's `token_balance` always equals the sum
//! of `amount_tokens` over its committed non-`hold` transactions.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Transaction types
// ---------------------------------------------------------------------------

/// The six kinds of ledger transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    /// Funds added: plan allocation, recharge, admin grant.
    Grant,
    /// Direct debit for a known-cost operation.
    Spend,
    /// Pessimistic reservation ahead of an uncertain-cost operation.
    Hold,
    /// Settlement of a hold with the actual token usage.
    HoldRelease,
    /// Funds returned; symmetric to a grant but tagged for reporting.
    Refund,
    /// Manual operator correction, signed either way.
    Adjustment,
}

impl TxType {
    /// Database/API string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Spend => "spend",
            Self::Hold => "hold",
            Self::HoldRelease => "hold_release",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    /// Parse the database/API string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grant" => Some(Self::Grant),
            "spend" => Some(Self::Spend),
            "hold" => Some(Self::Hold),
            "hold_release" => Some(Self::HoldRelease),
            "refund" => Some(Self::Refund),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }

    /// Whether rows of this type participate in the balance sum.
    ///
    /// Holds reserve tokens without moving the balance; every other type
    /// contributes its signed amount.
    pub fn affects_balance(self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// Apply the per-type sign convention to a caller-supplied magnitude.
///
/// Callers pass positive magnitudes for everything except `adjustment`,
/// which is already signed and passes through unchanged.
pub fn signed_amount(tx_type: TxType, magnitude: i64) -> i64 {
    match tx_type {
        TxType::Grant | TxType::Refund | TxType::Hold => magnitude,
        TxType::Spend | TxType::HoldRelease => -magnitude,
        TxType::Adjustment => magnitude,
    }
}

// ---------------------------------------------------------------------------
// Balance arithmetic
// ---------------------------------------------------------------------------

/// Tokens a wallet can still commit to new holds or debits.
///
/// Outstanding holds are already spoken for; the credit limit extends the
/// floor below zero.
pub fn spendable(balance: i64, hold_amount: i64, credit_limit: i64) -> i64 {
    balance - hold_amount + credit_limit
}

/// Check a direct debit of `amount` against the credit floor.
///
/// A debit is rejected when it would drive the balance below
/// `-credit_limit`. Outstanding holds do not gate direct debits; they gate
/// new holds (see [`check_hold`]).
pub fn check_debit(balance: i64, credit_limit: i64, amount: i64) -> Result<(), LedgerError> {
    if balance - amount < -credit_limit {
        return Err(LedgerError::InsufficientBalance {
            required: amount,
            spendable: balance + credit_limit,
        });
    }
    Ok(())
}

/// Check a new hold of `amount` against the credit floor, counting tokens
/// already reserved by outstanding holds.
pub fn check_hold(
    balance: i64,
    hold_amount: i64,
    credit_limit: i64,
    amount: i64,
) -> Result<(), LedgerError> {
    if balance - hold_amount - amount < -credit_limit {
        return Err(LedgerError::InsufficientBalance {
            required: amount,
            spendable: spendable(balance, hold_amount, credit_limit),
        });
    }
    Ok(())
}

/// Reject non-positive magnitudes for operations that require them.
pub fn check_positive(amount: i64, operation: &str) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "{operation} amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

/// Reject negative magnitudes (zero allowed; used for hold settlement).
pub fn check_non_negative(amount: i64, operation: &str) -> Result<(), LedgerError> {
    if amount < 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "{operation} amount must not be negative, got {amount}"
        )));
    }
    Ok(())
}

/// Reject a zero adjustment.
pub fn check_nonzero(amount: i64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount(
            "adjustment amount must be nonzero".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Meta stamping
// ---------------------------------------------------------------------------

/// Key carried in every transaction's meta bag: balance before the write.
pub const META_BALANCE_BEFORE: &str = "balance_before";
/// Key carried in every transaction's meta bag: balance after the write.
pub const META_BALANCE_AFTER: &str = "balance_after";

/// Stamp the mandatory balance snapshots into a (possibly caller-supplied)
/// meta bag. Caller keys are preserved; the snapshot keys always win.
pub fn stamp_balance_meta(
    meta: Option<serde_json::Value>,
    balance_before: i64,
    balance_after: i64,
) -> serde_json::Value {
    let mut map = match meta {
        Some(serde_json::Value::Object(map)) => map,
        // Non-object caller meta is nested rather than silently dropped.
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("caller_meta".into(), other);
            map
        }
        None => serde_json::Map::new(),
    };
    map.insert(META_BALANCE_BEFORE.into(), balance_before.into());
    map.insert(META_BALANCE_AFTER.into(), balance_after.into());
    serde_json::Value::Object(map)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed failure modes of ledger operations.
///
/// `InsufficientBalance` is a caller decision point, never retried.
/// A duplicate ref is deliberately NOT an error: the repository layer
/// translates it into an idempotent-replay success.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance: required {required}, spendable {spendable}")]
    InsufficientBalance { required: i64, spendable: i64 },

    #[error("No open hold with ref '{ref_id}'")]
    HoldNotFound { ref_id: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Storage failed after bounded retries; the operation did not commit.
    #[error("Ledger storage unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Operation receipts
// ---------------------------------------------------------------------------

/// Result of a credit or refund.
///
/// `idempotent = true` means this call was a replay of an earlier commit
/// with the same ref: nothing was written and `credited` is zero.
#[derive(Debug, Clone, Serialize)]
pub struct CreditReceipt {
    pub transaction_id: DbId,
    pub credited: i64,
    pub balance: i64,
    pub idempotent: bool,
}

/// Result of a direct debit.
#[derive(Debug, Clone, Serialize)]
pub struct DebitReceipt {
    pub transaction_id: DbId,
    pub debited: i64,
    pub balance: i64,
    pub idempotent: bool,
}

/// Result of placing a hold.
#[derive(Debug, Clone, Serialize)]
pub struct HoldReceipt {
    pub transaction_id: DbId,
    pub held: i64,
    pub hold_amount: i64,
    pub spendable: i64,
    pub idempotent: bool,
}

/// Result of releasing a hold.
///
/// `released` is the originally reserved amount returned to the spendable
/// pool; `settled` is what was actually debited (may be less, more, or
/// zero for a cancelled hold).
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReceipt {
    pub transaction_id: DbId,
    pub released: i64,
    pub settled: i64,
    pub balance: i64,
    pub hold_amount: i64,
    pub idempotent: bool,
}

/// Result of a manual adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustReceipt {
    pub transaction_id: DbId,
    pub applied: i64,
    pub balance: i64,
    pub idempotent: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
