//! Database and ledger backend implementations

pub mod memory;
pub mod postgres;

pub use memory::{MemoryDatabase, MemoryTransaction, TransactionStats};
pub use postgres::{PostgresDatabase, PostgresLedger, PostgresTransaction};
