//! Ledger - the persisted record of applied migration versions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrationResult;

/// One applied migration as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Surrogate id assigned by the store
    pub id: i64,
    /// Migration version, unique within the ledger
    pub version: u64,
    /// Migration name at the time it was applied
    pub name: String,
    /// When the entry was inserted, assigned by the store
    pub applied_at: DateTime<Utc>,
}

/// Persistent record of applied versions
///
/// An empty ledger is equivalent to being at version 0.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the ledger storage if absent, no-op otherwise
    async fn ensure_table(&self) -> MigrationResult<()>;

    /// Highest recorded version, 0 when no entry exists
    async fn latest_version(&self) -> MigrationResult<u64>;

    /// Record a version; fails with `LedgerConflict` if it is already recorded
    async fn insert(&self, version: u64, name: &str) -> MigrationResult<()>;

    /// Delete every entry with a version greater than or equal to `version`
    async fn remove_from(&self, version: u64) -> MigrationResult<u64>;

    /// Drop and recreate the given scope (e.g. a schema name)
    async fn drop_scope(&self, scope: &str) -> MigrationResult<()>;

    /// All entries ordered by version
    async fn entries(&self) -> MigrationResult<Vec<LedgerEntry>>;

    /// Drop and recreate a scope, then ensure the ledger storage exists again
    ///
    /// The two steps fail independently; they are not run atomically.
    async fn reset(&self, scope: &str) -> MigrationResult<()> {
        self.drop_scope(scope).await?;
        self.ensure_table().await
    }
}
