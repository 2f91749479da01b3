//! # elif-migrate
//!
//! Versioned, reversible schema migrations for elif.rs applications.
//!
//! ## Features
//!
//! - **Linear versions**: every migration carries a unique positive version
//! - **Reversible**: forward and backward procedures, walked in either direction
//! - **Ledger**: applied versions are persisted in a `migrations` table
//! - **Atomic steps**: each procedure runs inside its own transaction
//! - **Force and reset**: record a version without running bodies, or drop and recreate schemas
//!
//! ## Quick Start
//!
//! ```rust
//! use elif_migrate::{MemoryDatabase, MigrateOptions, MigrationDefinition, Migrator};
//! use std::sync::Arc;
//!
//! let migrations = vec![
//!     MigrationDefinition::new(1, "Create Users Table")
//!         .forward_sql("CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL)")
//!         .backward_sql("DROP TABLE users"),
//!     MigrationDefinition::new(2, "Add Email For Users")
//!         .forward_sql("ALTER TABLE users ADD COLUMN email TEXT")
//!         .backward_sql("ALTER TABLE users DROP COLUMN email"),
//! ];
//!
//! # tokio_test::block_on(async {
//! let database = MemoryDatabase::new();
//! let migrator = Migrator::with_database(
//!     migrations,
//!     Arc::new(database.clone()),
//!     Arc::new(database.clone()),
//! )
//! .unwrap();
//!
//! // Apply everything
//! let report = migrator.migrate(&MigrateOptions::default()).await.unwrap();
//! assert_eq!(report.versions(), &[1, 2]);
//!
//! // Walk back to version 1
//! let report = migrator.migrate(&MigrateOptions::to_version(1)).await.unwrap();
//! assert_eq!(report.current_version(), 1);
//! # });
//! ```

pub mod backends;
pub mod config;
pub mod database;
pub mod definition;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod runner;
pub mod set;

pub use backends::{
    MemoryDatabase, MemoryTransaction, PostgresDatabase, PostgresLedger, PostgresTransaction,
    TransactionStats,
};
pub use config::{LedgerConfig, LedgerConfigBuilder, MigrateOptions, MigrateOptionsBuilder};
pub use database::{DatabaseTransaction, SqlValue, TransactionalDatabase};
pub use definition::{ChangeProcedure, Direction, MigrationDefinition, SqlScript};
pub use engine::{InfoSink, MigrationReport, MigrationState, MigrationStatus, Migrator};
pub use error::{
    ErrorKind, MigrationError, MigrationResult, RunPhase, StepError, StepResult, TransactionPhase,
};
pub use ledger::{Ledger, LedgerEntry};
pub use runner::{ScopedTransactionRunner, TransactionRunner};
pub use set::MigrationSet;
