//! Migration Definitions - caller supplied, versioned change units
//!
//! A [`MigrationDefinition`] pairs a version and a name with up to two change
//! procedures: `forward` advances the schema, `backward` reverts it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::database::DatabaseTransaction;
use crate::error::StepResult;

/// Direction a migration is walked in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Apply the migration (run forward procedures)
    Forward,
    /// Revert the migration (run backward procedures)
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// A change procedure run inside one transaction
///
/// The engine never inspects what a procedure does; it only hands it the open
/// transaction and commits or rolls back depending on the outcome.
#[async_trait]
pub trait ChangeProcedure: Send + Sync {
    /// Run the procedure against the open transaction
    async fn apply(&self, tx: &mut dyn DatabaseTransaction) -> StepResult;
}

/// Procedure made of plain SQL statements, executed in order without parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    statements: Vec<String>,
}

impl SqlScript {
    /// Create a script holding a single statement
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statements: vec![statement.into()],
        }
    }

    /// Create a script from several statements
    pub fn statements<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.statements
    }
}

#[async_trait]
impl ChangeProcedure for SqlScript {
    async fn apply(&self, tx: &mut dyn DatabaseTransaction) -> StepResult {
        for statement in &self.statements {
            if statement.trim().is_empty() {
                continue;
            }
            tx.execute(statement, &[]).await?;
        }
        Ok(())
    }
}

/// A single versioned migration
#[derive(Clone)]
pub struct MigrationDefinition {
    version: u64,
    name: String,
    forward: Option<Arc<dyn ChangeProcedure>>,
    backward: Option<Arc<dyn ChangeProcedure>>,
}

impl MigrationDefinition {
    /// Create a definition with no procedures attached yet
    pub fn new(version: u64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            forward: None,
            backward: None,
        }
    }

    /// Attach the schema-advancing procedure
    pub fn forward(mut self, procedure: impl ChangeProcedure + 'static) -> Self {
        self.forward = Some(Arc::new(procedure));
        self
    }

    /// Attach the schema-reverting procedure
    pub fn backward(mut self, procedure: impl ChangeProcedure + 'static) -> Self {
        self.backward = Some(Arc::new(procedure));
        self
    }

    /// Attach a forward procedure consisting of one SQL statement
    pub fn forward_sql(self, statement: impl Into<String>) -> Self {
        self.forward(SqlScript::new(statement))
    }

    /// Attach a backward procedure consisting of one SQL statement
    pub fn backward_sql(self, statement: impl Into<String>) -> Self {
        self.backward(SqlScript::new(statement))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Procedure for the given direction, if defined
    pub fn procedure(&self, direction: Direction) -> Option<&dyn ChangeProcedure> {
        match direction {
            Direction::Forward => self.forward.as_deref(),
            Direction::Backward => self.backward.as_deref(),
        }
    }

    /// Whether at least one direction is defined
    pub fn has_body(&self) -> bool {
        self.forward.is_some() || self.backward.is_some()
    }
}

impl fmt::Debug for MigrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationDefinition")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("forward", &self.forward.is_some())
            .field("backward", &self.backward.is_some())
            .finish()
    }
}
