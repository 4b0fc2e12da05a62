//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. [`LedgerRepo`] is the only
//! writer of ledger transactions and wallet counters; everything else is
//! a read path or the alert/pricing admin surface.

pub mod alert_repo;
pub mod ledger_repo;
pub mod pricing_repo;
pub mod transaction_repo;
pub mod wallet_repo;

pub use alert_repo::AlertRepo;
pub use ledger_repo::LedgerRepo;
pub use pricing_repo::PricingRepo;
pub use transaction_repo::TransactionRepo;
pub use wallet_repo::WalletRepo;
