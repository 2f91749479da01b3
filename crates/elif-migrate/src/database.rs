//! Executable transactional handle consumed by the engine
//!
//! These traits abstract away the concrete driver. Migration bodies receive a
//! [`DatabaseTransaction`] and may issue arbitrary statements through it.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::MigrationResult;

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl SqlValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float64(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for SqlValue {
    fn from(value: uuid::Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for SqlValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        SqlValue::DateTime(value)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        SqlValue::Json(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// An open transaction
///
/// `commit` and `rollback` borrow the transaction so that a failed commit can
/// still be followed by a rollback attempt.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> MigrationResult<u64>;

    /// Commit the transaction
    async fn commit(&mut self) -> MigrationResult<()>;

    /// Rollback the transaction
    async fn rollback(&mut self) -> MigrationResult<()>;
}

/// A database able to open transactions
#[async_trait]
pub trait TransactionalDatabase: Send + Sync {
    /// Begin a transaction
    async fn begin(&self) -> MigrationResult<Box<dyn DatabaseTransaction>>;
}
