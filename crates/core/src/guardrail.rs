//! Guardrail rule constants, alert types, and pure rule evaluation.
//!
//! The monitor itself is a stateless sweep (worker crate) over transaction
//! log windows and wallet snapshots; the rules live here so each one is
//! independently testable.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rule constants
// ---------------------------------------------------------------------------

/// Spend-spike trigger factor: trailing-24h debits must exceed this multiple
/// of the trailing daily average.
pub const DEFAULT_SPIKE_FACTOR: f64 = 2.0;

/// Days of history used for the spend-spike baseline average.
pub const DEFAULT_SPIKE_BASELINE_DAYS: i64 = 7;

/// System-wide cap on tokens a single request may require, independent of
/// wallet balance.
pub const PER_TURN_TOKEN_CAP: i64 = 200_000;

// ---------------------------------------------------------------------------
// Alert types
// ---------------------------------------------------------------------------

/// Guardrail conditions the monitor can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Trailing-24h debits far above the user's recent daily average.
    SpendSpike,
    /// A hold placement failed for lack of spendable tokens.
    InsufficientTokens,
    /// A wallet was observed with a negative balance (permitted within the
    /// credit limit, but flagged for review).
    NegativeBalance,
    /// A single request required more tokens than the per-turn cap.
    CapExceeded,
}

impl AlertType {
    /// Database/API string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpendSpike => "spend_spike",
            Self::InsufficientTokens => "insufficient_tokens",
            Self::NegativeBalance => "negative_balance",
            Self::CapExceeded => "cap_exceeded",
        }
    }

    /// Parse the database/API string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spend_spike" => Some(Self::SpendSpike),
            "insufficient_tokens" => Some(Self::InsufficientTokens),
            "negative_balance" => Some(Self::NegativeBalance),
            "cap_exceeded" => Some(Self::CapExceeded),
            _ => None,
        }
    }

    /// Severity each rule raises at.
    pub fn severity(self) -> Severity {
        match self {
            Self::NegativeBalance => Severity::Critical,
            Self::SpendSpike | Self::InsufficientTokens | Self::CapExceeded => Severity::Warning,
        }
    }
}

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// Spend-spike rule
// ---------------------------------------------------------------------------

/// Numeric snapshot attached to a spend-spike alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeFinding {
    pub total_24h: i64,
    pub avg_daily: f64,
    pub delta_pct: f64,
}

/// Evaluate the spend-spike rule for one user.
///
/// `total_24h` is the trailing-24h debit total; `baseline_total` is the
/// debit total over the `baseline_days` before that. Users with no
/// baseline never spike (a first day of spending is not a spike).
pub fn detect_spend_spike(
    total_24h: i64,
    baseline_total: i64,
    baseline_days: i64,
    factor: f64,
) -> Option<SpikeFinding> {
    if baseline_days <= 0 || baseline_total <= 0 {
        return None;
    }
    let avg_daily = baseline_total as f64 / baseline_days as f64;
    if (total_24h as f64) <= factor * avg_daily {
        return None;
    }
    let delta_pct = (total_24h as f64 - avg_daily) / avg_daily * 100.0;
    Some(SpikeFinding {
        total_24h,
        avg_daily,
        delta_pct,
    })
}

// ---------------------------------------------------------------------------
// Per-turn cap rule
// ---------------------------------------------------------------------------

/// Whether a single request's required tokens exceed the per-turn cap.
pub fn exceeds_turn_cap(required_tokens: i64) -> bool {
    required_tokens > PER_TURN_TOKEN_CAP
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
