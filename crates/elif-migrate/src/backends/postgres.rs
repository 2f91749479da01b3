//! PostgreSQL Backend Implementation
//!
//! Provides the PostgreSQL implementation of the transactional handle and the
//! ledger using sqlx as the underlying database driver.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres, Row};
use tracing::debug;

use crate::config::{quote_identifier, LedgerConfig};
use crate::database::{DatabaseTransaction, SqlValue, TransactionalDatabase};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::{Ledger, LedgerEntry};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL database opening one pooled transaction per migration
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Create a new database handle from an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database handle from a database URL
    pub async fn connect(database_url: &str) -> MigrationResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalDatabase for PostgresDatabase {
    async fn begin(&self) -> MigrationResult<Box<dyn DatabaseTransaction>> {
        let transaction = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction {
            inner: Some(transaction),
        }))
    }
}

/// PostgreSQL transaction wrapper
pub struct PostgresTransaction {
    inner: Option<sqlx::Transaction<'static, Postgres>>,
}

#[async_trait]
impl DatabaseTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> MigrationResult<u64> {
        let transaction = self.inner.as_mut().ok_or_else(|| {
            MigrationError::Database("transaction already finished".to_string())
        })?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let result = query.execute(&mut **transaction).await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> MigrationResult<()> {
        match self.inner.take() {
            Some(transaction) => transaction.commit().await.map_err(MigrationError::from),
            None => Err(MigrationError::Database(
                "transaction already finished".to_string(),
            )),
        }
    }

    async fn rollback(&mut self) -> MigrationResult<()> {
        match self.inner.take() {
            Some(transaction) => transaction.rollback().await.map_err(MigrationError::from),
            None => {
                // A failed commit consumes the sqlx transaction, which rolls back on drop
                debug!("Transaction already released, nothing to roll back");
                Ok(())
            }
        }
    }
}

/// Bind a [`SqlValue`] to a sqlx query
fn bind_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int32(i) => query.bind(*i),
        SqlValue::Int64(i) => query.bind(*i),
        SqlValue::Float64(f) => query.bind(*f),
        SqlValue::String(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Uuid(u) => query.bind(*u),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::Json(j) => query.bind(j.clone()),
    }
}

/// Ledger stored in a PostgreSQL table
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
    config: LedgerConfig,
}

impl PostgresLedger {
    /// Create a ledger with the default `migrations` table
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: LedgerConfig::default(),
        }
    }

    /// Create a ledger with a custom table location
    pub fn with_config(pool: PgPool, config: LedgerConfig) -> MigrationResult<Self> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    /// SQL to create the migrations tracking table
    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\n    \
                version BIGINT NOT NULL UNIQUE,\n    \
                name VARCHAR(255) NOT NULL\n\
            )",
            self.config.qualified_table()
        )
    }
}

fn to_sql_version(version: u64) -> MigrationResult<i64> {
    i64::try_from(version).map_err(|_| {
        MigrationError::Configuration(format!("version {} does not fit in BIGINT", version))
    })
}

fn from_sql_version(version: i64) -> MigrationResult<u64> {
    u64::try_from(version)
        .map_err(|_| MigrationError::Database(format!("negative version {} in ledger", version)))
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn ensure_table(&self) -> MigrationResult<()> {
        if let Some(schema) = self.config.get_schema() {
            let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema));
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to create migrations table: {}", e)))?;
        Ok(())
    }

    async fn latest_version(&self) -> MigrationResult<u64> {
        let sql = format!(
            "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
            self.config.qualified_table()
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => from_sql_version(row.try_get::<i64, _>("version")?),
            None => Ok(0),
        }
    }

    async fn insert(&self, version: u64, name: &str) -> MigrationResult<()> {
        let sql = format!(
            "INSERT INTO {} (version, name) VALUES ($1, $2)",
            self.config.qualified_table()
        );

        sqlx::query(&sql)
            .bind(to_sql_version(version)?)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let unique_violation = matches!(
                    &e,
                    sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                );
                if unique_violation {
                    MigrationError::LedgerConflict { version }
                } else {
                    MigrationError::from(e)
                }
            })?;
        Ok(())
    }

    async fn remove_from(&self, version: u64) -> MigrationResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE version >= $1",
            self.config.qualified_table()
        );
        let result = sqlx::query(&sql)
            .bind(to_sql_version(version)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn drop_scope(&self, scope: &str) -> MigrationResult<()> {
        let quoted = quote_identifier(scope);
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quoted))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn entries(&self) -> MigrationResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT id, created_at, version, name FROM {} ORDER BY version ASC",
            self.config.qualified_table()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i32 = row.try_get("id")?;
            entries.push(LedgerEntry {
                id: i64::from(id),
                version: from_sql_version(row.try_get("version")?)?,
                name: row.try_get("name")?,
                applied_at: row.try_get("created_at")?,
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conversion() {
        assert_eq!(to_sql_version(3).unwrap(), 3);
        assert!(to_sql_version(u64::MAX).is_err());
        assert_eq!(from_sql_version(7).unwrap(), 7);
        assert!(from_sql_version(-1).is_err());
    }
}
