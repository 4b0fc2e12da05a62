//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the operations that write to it

pub mod alert;
pub mod ledger;
pub mod pricing;
pub mod transaction;
pub mod wallet;
