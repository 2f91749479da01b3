//! Error types for the migration engine
//!
//! Every failure surfaced by [`Migrator::migrate`](crate::Migrator::migrate) is a
//! [`MigrationError`]. Internal failures are wrapped with the phase of the run and,
//! when a migration body was involved, the version and name of that migration.
//! Use [`MigrationError::kind`] to classify an error without matching on the wrappers.

use std::fmt;
use thiserror::Error;

use crate::definition::Direction;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error returned by a migration body
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for migration bodies
pub type StepResult = Result<(), StepError>;

/// Transaction lifecycle step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionPhase::Begin => write!(f, "begin"),
            TransactionPhase::Commit => write!(f, "commit"),
            TransactionPhase::Rollback => write!(f, "rollback"),
        }
    }
}

/// Step of a migration run an error was raised in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    ResetScope(String),
    EnsureLedger,
    ReadLatest,
    ForceVersion(u64),
    RecordVersion(u64),
    RemoveFrom(u64),
    ReadEntries,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::ResetScope(scope) => write!(f, "failed to reset scope '{}'", scope),
            RunPhase::EnsureLedger => write!(f, "failed to ensure migrations table"),
            RunPhase::ReadLatest => write!(f, "failed to get the latest applied version"),
            RunPhase::ForceVersion(version) => write!(f, "failed to force version {}", version),
            RunPhase::RecordVersion(version) => {
                write!(f, "failed to record version {} in the ledger", version)
            }
            RunPhase::RemoveFrom(version) => {
                write!(f, "failed to remove ledger entries from version {}", version)
            }
            RunPhase::ReadEntries => write!(f, "failed to read ledger entries"),
        }
    }
}

/// Classification of a [`MigrationError`], independent of the context it was wrapped in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Two definitions share a version, or the ledger already holds the version
    DuplicateVersion,
    /// A definition uses version 0
    InvalidVersion,
    /// A definition has an empty name
    EmptyName,
    /// A definition lacks the procedure a run needs
    MissingBody,
    /// A forced version is not part of the migration set
    VersionNotFound,
    /// Begin, commit or rollback of a transaction failed
    TransactionFailure,
    /// A migration body returned an error
    ApplyFailure,
    /// The ledger or database reported an I/O failure
    Database,
    /// Options were rejected before the run started
    Configuration,
}

/// Migration engine errors
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("{first} ({version}) and {second} ({version}) have duplicate version numbers")]
    DuplicateVersion {
        version: u64,
        first: String,
        second: String,
    },

    #[error("{name} has version 0, versions must be positive")]
    InvalidVersion { name: String },

    #[error("migration {version} name cannot be empty")]
    EmptyName { version: u64 },

    #[error("{name} ({version}) at least one migration procedure is required")]
    MissingBody { version: u64, name: String },

    #[error("{name} ({version}) has no {direction} procedure")]
    MissingDirection {
        version: u64,
        name: String,
        direction: Direction,
    },

    #[error("version {version} is already recorded in the ledger")]
    LedgerConflict { version: u64 },

    #[error("migration version {0} not found")]
    VersionNotFound(u64),

    #[error("transaction {phase} failed: {source}{}", rollback_note(.rollback))]
    Transaction {
        phase: TransactionPhase,
        #[source]
        source: Box<MigrationError>,
        rollback: Option<Box<MigrationError>>,
    },

    #[error("migration body failed: {source}{}", rollback_note(.rollback))]
    Body {
        #[source]
        source: StepError,
        rollback: Option<Box<MigrationError>>,
    },

    #[error("{direction} migration {version} ({name}) failed: {source}")]
    Step {
        version: u64,
        name: String,
        direction: Direction,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("{phase}: {source}")]
    Phase {
        phase: RunPhase,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn rollback_note(rollback: &Option<Box<MigrationError>>) -> String {
    match rollback {
        Some(err) => format!(" (rollback also failed: {})", err),
        None => String::new(),
    }
}

impl MigrationError {
    /// Classify the error, looking through phase and version context
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::DuplicateVersion { .. } | MigrationError::LedgerConflict { .. } => {
                ErrorKind::DuplicateVersion
            }
            MigrationError::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            MigrationError::EmptyName { .. } => ErrorKind::EmptyName,
            MigrationError::MissingBody { .. } | MigrationError::MissingDirection { .. } => {
                ErrorKind::MissingBody
            }
            MigrationError::VersionNotFound(_) => ErrorKind::VersionNotFound,
            MigrationError::Transaction { .. } => ErrorKind::TransactionFailure,
            MigrationError::Body { .. } => ErrorKind::ApplyFailure,
            MigrationError::Step { source, .. } | MigrationError::Phase { source, .. } => {
                source.kind()
            }
            MigrationError::Database(_) => ErrorKind::Database,
            MigrationError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Version of the migration that was being applied or reverted, if any
    pub fn failed_version(&self) -> Option<u64> {
        match self {
            MigrationError::Step { version, .. } => Some(*version),
            MigrationError::MissingDirection { version, .. } => Some(*version),
            MigrationError::Phase { source, .. } => source.failed_version(),
            _ => None,
        }
    }

    /// Rollback failure recorded alongside the primary error, if any
    pub fn rollback_error(&self) -> Option<&MigrationError> {
        match self {
            MigrationError::Transaction { rollback, .. } | MigrationError::Body { rollback, .. } => {
                rollback.as_deref()
            }
            MigrationError::Step { source, .. } | MigrationError::Phase { source, .. } => {
                source.rollback_error()
            }
            _ => None,
        }
    }

    pub(crate) fn in_phase(self, phase: RunPhase) -> Self {
        MigrationError::Phase {
            phase,
            source: Box::new(self),
        }
    }

    pub(crate) fn at_step(self, version: u64, name: &str, direction: Direction) -> Self {
        MigrationError::Step {
            version,
            name: name.to_string(),
            direction,
            source: Box::new(self),
        }
    }

    pub(crate) fn transaction(
        phase: TransactionPhase,
        source: MigrationError,
        rollback: Option<MigrationError>,
    ) -> Self {
        MigrationError::Transaction {
            phase,
            source: Box::new(source),
            rollback: rollback.map(Box::new),
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}
