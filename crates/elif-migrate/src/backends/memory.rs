//! In-memory database and ledger for development and testing
//!
//! A [`MemoryDatabase`] plays both collaborator roles over one shared state:
//! it opens transactions that stage statements until commit, and it keeps the
//! ledger. Failures can be injected to exercise rollback paths.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::{DatabaseTransaction, SqlValue, TransactionalDatabase};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::{Ledger, LedgerEntry};

/// Counters of transaction outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Default)]
struct Failures {
    begin: bool,
    commit: bool,
    rollback: bool,
    statement: Option<String>,
    ledger_insert: Option<u64>,
}

#[derive(Debug)]
struct MemoryState {
    scope: String,
    ledger_ready: bool,
    ledger: BTreeMap<u64, LedgerEntry>,
    next_id: i64,
    statements: Vec<String>,
    dropped_scopes: Vec<String>,
    stats: TransactionStats,
    failures: Failures,
}

impl MemoryState {
    fn new(scope: String) -> Self {
        Self {
            scope,
            ledger_ready: false,
            ledger: BTreeMap::new(),
            next_id: 1,
            statements: Vec::new(),
            dropped_scopes: Vec::new(),
            stats: TransactionStats::default(),
            failures: Failures::default(),
        }
    }

    fn require_ledger(&self) -> MigrationResult<()> {
        if self.ledger_ready {
            Ok(())
        } else {
            Err(MigrationError::Database(
                "ledger table does not exist".to_string(),
            ))
        }
    }
}

/// In-memory database backend
#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    /// Create an empty database whose ledger lives in the `public` scope
    pub fn new() -> Self {
        Self::with_scope("public")
    }

    /// Create an empty database whose ledger lives in the given scope
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::new(scope.into()))),
        }
    }

    /// Committed statements, in commit order
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Versions currently recorded in the ledger, ascending
    pub fn applied_versions(&self) -> Vec<u64> {
        self.state.lock().ledger.keys().copied().collect()
    }

    /// Scopes dropped so far, in order
    pub fn dropped_scopes(&self) -> Vec<String> {
        self.state.lock().dropped_scopes.clone()
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.state.lock().stats
    }

    /// Insert a ledger entry directly, bypassing the engine
    pub fn seed_ledger(&self, version: u64, name: &str) {
        let mut state = self.state.lock();
        state.ledger_ready = true;
        let id = state.next_id;
        state.next_id += 1;
        state.ledger.insert(
            version,
            LedgerEntry {
                id,
                version,
                name: name.to_string(),
                applied_at: Utc::now(),
            },
        );
    }

    /// Make every `begin` fail
    pub fn fail_begins(&self, fail: bool) {
        self.state.lock().failures.begin = fail;
    }

    /// Make every `commit` fail
    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().failures.commit = fail;
    }

    /// Make every `rollback` fail
    pub fn fail_rollbacks(&self, fail: bool) {
        self.state.lock().failures.rollback = fail;
    }

    /// Make statements containing `fragment` fail when executed
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) {
        self.state.lock().failures.statement = Some(fragment.into());
    }

    /// Make the ledger insert of `version` fail
    pub fn fail_ledger_insert(&self, version: u64) {
        self.state.lock().failures.ledger_insert = Some(version);
    }

    /// Remove every injected failure
    pub fn clear_failures(&self) {
        self.state.lock().failures = Failures::default();
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalDatabase for MemoryDatabase {
    async fn begin(&self) -> MigrationResult<Box<dyn DatabaseTransaction>> {
        let mut state = self.state.lock();
        if state.failures.begin {
            return Err(MigrationError::Database(
                "could not open transaction".to_string(),
            ));
        }
        state.stats.begun += 1;

        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            staged: Vec::new(),
            finished: false,
        }))
    }
}

/// Transaction staging statements until commit
pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    staged: Vec<String>,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> MigrationResult<()> {
        if self.finished {
            Err(MigrationError::Database(
                "transaction already finished".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatabaseTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> MigrationResult<u64> {
        self.ensure_open()?;
        let state = self.state.lock();
        if let Some(fragment) = &state.failures.statement {
            if sql.contains(fragment.as_str()) {
                return Err(MigrationError::Database(format!(
                    "statement rejected: {}",
                    sql
                )));
            }
        }
        drop(state);

        self.staged.push(sql.to_string());
        Ok(0)
    }

    async fn commit(&mut self) -> MigrationResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if state.failures.commit {
            return Err(MigrationError::Database("could not commit".to_string()));
        }

        state.statements.append(&mut self.staged);
        state.stats.committed += 1;
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> MigrationResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if state.failures.rollback {
            return Err(MigrationError::Database("could not roll back".to_string()));
        }

        self.staged.clear();
        state.stats.rolled_back += 1;
        self.finished = true;
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryDatabase {
    async fn ensure_table(&self) -> MigrationResult<()> {
        self.state.lock().ledger_ready = true;
        Ok(())
    }

    async fn latest_version(&self) -> MigrationResult<u64> {
        let state = self.state.lock();
        state.require_ledger()?;
        Ok(state.ledger.keys().next_back().copied().unwrap_or(0))
    }

    async fn insert(&self, version: u64, name: &str) -> MigrationResult<()> {
        let mut state = self.state.lock();
        state.require_ledger()?;
        if state.failures.ledger_insert == Some(version) {
            return Err(MigrationError::Database(format!(
                "could not insert version {}",
                version
            )));
        }
        if state.ledger.contains_key(&version) {
            return Err(MigrationError::LedgerConflict { version });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.ledger.insert(
            version,
            LedgerEntry {
                id,
                version,
                name: name.to_string(),
                applied_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove_from(&self, version: u64) -> MigrationResult<u64> {
        let mut state = self.state.lock();
        state.require_ledger()?;
        let removed = state.ledger.split_off(&version);
        Ok(removed.len() as u64)
    }

    async fn drop_scope(&self, scope: &str) -> MigrationResult<()> {
        let mut state = self.state.lock();
        state.dropped_scopes.push(scope.to_string());

        // The ledger and all committed schema changes live in the ledger scope
        if state.scope == scope {
            state.ledger.clear();
            state.statements.clear();
            state.ledger_ready = false;
        }
        Ok(())
    }

    async fn entries(&self) -> MigrationResult<Vec<LedgerEntry>> {
        let state = self.state.lock();
        state.require_ledger()?;
        Ok(state.ledger.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_requires_table() {
        let database = MemoryDatabase::new();
        let err = database.latest_version().await.unwrap_err();
        assert_eq!(err.to_string(), "Database error: ledger table does not exist");

        database.ensure_table().await.unwrap();
        database.ensure_table().await.unwrap();
        assert_eq!(database.latest_version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ledger_insert_and_remove() {
        let database = MemoryDatabase::new();
        database.ensure_table().await.unwrap();

        database.insert(1, "Create Users Table").await.unwrap();
        database.insert(2, "Add Email For Users").await.unwrap();
        database.insert(3, "Add Address For Users").await.unwrap();
        assert_eq!(database.latest_version().await.unwrap(), 3);

        let err = database.insert(2, "Add Email For Users").await.unwrap_err();
        assert!(matches!(err, MigrationError::LedgerConflict { version: 2 }));

        assert_eq!(database.remove_from(2).await.unwrap(), 2);
        assert_eq!(database.applied_versions(), vec![1]);
        assert_eq!(database.remove_from(5).await.unwrap(), 0);

        let entries = database.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Create Users Table");
    }

    #[tokio::test]
    async fn test_reset_clears_ledger_scope_only() {
        let database = MemoryDatabase::new();
        database.seed_ledger(1, "Create Users Table");

        database.reset("audit").await.unwrap();
        assert_eq!(database.applied_versions(), vec![1]);

        database.reset("public").await.unwrap();
        assert!(database.applied_versions().is_empty());
        assert_eq!(database.latest_version().await.unwrap(), 0);
        assert_eq!(database.dropped_scopes(), vec!["audit", "public"]);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_statements() {
        let database = MemoryDatabase::new();
        let mut tx = database.begin().await.unwrap();
        tx.execute("CREATE TABLE users (id INTEGER)", &[]).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(database.statements().is_empty());
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_statement_failure_injection() {
        let database = MemoryDatabase::new();
        database.fail_statements_containing("email");

        let mut tx = database.begin().await.unwrap();
        tx.execute("CREATE TABLE users (id INTEGER)", &[]).await.unwrap();
        assert!(tx
            .execute("ALTER TABLE users ADD COLUMN email TEXT", &[])
            .await
            .is_err());
    }
}
