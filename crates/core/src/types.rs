/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// User ids are issued by the upstream identity service; also 64-bit.
/// The ledger never creates users, it only keys wallets by them.
pub type UserId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
