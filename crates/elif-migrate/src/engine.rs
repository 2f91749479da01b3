//! Migration Engine - brings the schema to a target version
//!
//! One call to [`Migrator::migrate`] performs one run:
//!
//! 1. reset the requested scopes, or just ensure the ledger table exists
//! 2. force a version into the ledger without running bodies, if requested
//! 3. read the latest applied version once
//! 4. report it and stop, if only a status query was requested
//! 5. resolve the target (0 means the highest known version)
//! 6. walk backward when the target is below the latest version, forward otherwise
//!
//! Each body runs in its own transaction through the [`TransactionRunner`]; the
//! ledger is updated in a separate step right after the body commits. A crash
//! between the two leaves the schema one version ahead of the ledger.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::MigrateOptions;
use crate::database::TransactionalDatabase;
use crate::definition::{Direction, MigrationDefinition};
use crate::error::{MigrationError, MigrationResult, RunPhase};
use crate::ledger::Ledger;
use crate::runner::{ScopedTransactionRunner, TransactionRunner};
use crate::set::MigrationSet;

/// Info level logging sink
pub type InfoSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome of a migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MigrationReport {
    /// A status query reported the applied version
    Info { current_version: u64 },
    /// A version was forced into the ledger without running bodies
    Forced { version: u64 },
    /// The migration set was empty
    NoMigrations { current_version: u64 },
    /// Migrations were walked in one direction; `versions` may be empty
    Applied {
        direction: Direction,
        from_version: u64,
        to_version: u64,
        versions: Vec<u64>,
    },
}

impl MigrationReport {
    /// Version recorded in the ledger once the run finished
    pub fn current_version(&self) -> u64 {
        match self {
            MigrationReport::Info { current_version }
            | MigrationReport::NoMigrations { current_version } => *current_version,
            MigrationReport::Forced { version } => *version,
            MigrationReport::Applied { to_version, .. } => *to_version,
        }
    }

    /// Versions whose bodies ran, in the order they ran
    pub fn versions(&self) -> &[u64] {
        match self {
            MigrationReport::Applied { versions, .. } => versions,
            _ => &[],
        }
    }
}

/// Status of a migration relative to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MigrationState {
    /// Known definition without a ledger entry
    Pending,
    /// Known definition recorded in the ledger
    Applied {
        applied_at: chrono::DateTime<chrono::Utc>,
    },
    /// Ledger entry without a matching definition
    Orphaned {
        applied_at: chrono::DateTime<chrono::Utc>,
    },
}

/// One row of [`Migrator::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    pub state: MigrationState,
}

/// Migration orchestrator
pub struct Migrator {
    migrations: MigrationSet,
    ledger: Arc<dyn Ledger>,
    runner: Arc<dyn TransactionRunner>,
    info: InfoSink,
}

impl Migrator {
    /// Create a new migrator, validating the definitions
    pub fn new(
        definitions: impl IntoIterator<Item = MigrationDefinition>,
        ledger: Arc<dyn Ledger>,
        runner: Arc<dyn TransactionRunner>,
    ) -> MigrationResult<Self> {
        Ok(Self {
            migrations: MigrationSet::new(definitions)?,
            ledger,
            runner,
            info: Arc::new(|message: &str| info!("{}", message)),
        })
    }

    /// Create a new migrator running each body in a transaction on `database`
    pub fn with_database(
        definitions: impl IntoIterator<Item = MigrationDefinition>,
        database: Arc<dyn TransactionalDatabase>,
        ledger: Arc<dyn Ledger>,
    ) -> MigrationResult<Self> {
        let runner = Arc::new(ScopedTransactionRunner::new(database));
        Self::new(definitions, ledger, runner)
    }

    /// Replace the info sink, which defaults to `tracing::info!`
    pub fn with_info_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.info = Arc::new(sink);
        self
    }

    fn log_info(&self, message: &str) {
        (self.info)(message);
    }

    /// Execute one migration run based on the given options
    pub async fn migrate(&self, options: &MigrateOptions) -> MigrationResult<MigrationReport> {
        options.validate()?;

        self.prepare(options).await?;

        if *options.get_force_version() {
            return self.force_version(*options.get_target_version()).await;
        }

        let latest = self
            .ledger
            .latest_version()
            .await
            .map_err(|e| e.in_phase(RunPhase::ReadLatest))?;
        debug!("Latest applied migration version: {}", latest);

        if *options.get_print_info_and_exit() {
            self.log_info(&format!("currently applied version: {}", latest));
            return Ok(MigrationReport::Info {
                current_version: latest,
            });
        }

        self.apply_migrations(latest, *options.get_target_version()).await
    }

    /// Every known and every recorded migration with its state, ordered by version
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatus>> {
        self.ledger
            .ensure_table()
            .await
            .map_err(|e| e.in_phase(RunPhase::EnsureLedger))?;

        let entries = self
            .ledger
            .entries()
            .await
            .map_err(|e| e.in_phase(RunPhase::ReadEntries))?;
        let mut recorded: BTreeMap<u64, _> = entries.into_iter().map(|e| (e.version, e)).collect();

        let mut statuses: Vec<MigrationStatus> = self
            .migrations
            .ascending()
            .into_iter()
            .map(|definition| {
                let state = match recorded.remove(&definition.version()) {
                    Some(entry) => MigrationState::Applied {
                        applied_at: entry.applied_at,
                    },
                    None => MigrationState::Pending,
                };
                MigrationStatus {
                    version: definition.version(),
                    name: definition.name().to_string(),
                    state,
                }
            })
            .collect();

        statuses.extend(recorded.into_values().map(|entry| MigrationStatus {
            version: entry.version,
            name: entry.name,
            state: MigrationState::Orphaned {
                applied_at: entry.applied_at,
            },
        }));
        statuses.sort_by_key(|status| status.version);

        Ok(statuses)
    }

    async fn prepare(&self, options: &MigrateOptions) -> MigrationResult<()> {
        if !*options.get_refresh_schema() {
            return self
                .ledger
                .ensure_table()
                .await
                .map_err(|e| e.in_phase(RunPhase::EnsureLedger));
        }

        self.log_info("refreshing database");
        for scope in options.get_schemas() {
            debug!("Dropping and recreating scope {}", scope);
            self.ledger
                .reset(scope)
                .await
                .map_err(|e| e.in_phase(RunPhase::ResetScope(scope.clone())))?;
        }
        self.log_info("migrations table is present");

        Ok(())
    }

    async fn force_version(&self, version: u64) -> MigrationResult<MigrationReport> {
        let definition = self
            .migrations
            .find(version)
            .ok_or(MigrationError::VersionNotFound(version))
            .map_err(|e| e.in_phase(RunPhase::ForceVersion(version)))?;

        self.log_info(&format!(
            "forcing version {} ({}) without running migrations",
            definition.version(),
            definition.name()
        ));

        let removed = self
            .ledger
            .remove_from(version)
            .await
            .map_err(|e| e.in_phase(RunPhase::RemoveFrom(version)))?;
        debug!("Removed {} ledger entries from version {}", removed, version);

        self.ledger
            .insert(version, definition.name())
            .await
            .map_err(|e| e.in_phase(RunPhase::RecordVersion(version)))?;

        Ok(MigrationReport::Forced { version })
    }

    async fn apply_migrations(&self, latest: u64, requested: u64) -> MigrationResult<MigrationReport> {
        if self.migrations.is_empty() {
            self.log_info("no migrations to apply.");
            return Ok(MigrationReport::NoMigrations {
                current_version: latest,
            });
        }

        let target = if requested == 0 {
            self.migrations.highest_version()
        } else {
            requested
        };

        if target < latest {
            self.apply_backward(latest, target).await
        } else {
            self.apply_forward(latest, target).await
        }
    }

    async fn apply_forward(&self, latest: u64, target: u64) -> MigrationResult<MigrationReport> {
        let mut versions = Vec::new();

        for definition in self.migrations.ascending() {
            let version = definition.version();
            if version <= latest {
                continue;
            }
            if target != 0 && version > target {
                break;
            }

            self.log_info(&format!(
                "applying forward migration {} ({})",
                version,
                definition.name()
            ));
            self.run_step(definition, Direction::Forward).await?;

            self.ledger
                .insert(version, definition.name())
                .await
                .map_err(|e| e.in_phase(RunPhase::RecordVersion(version)))?;
            versions.push(version);
        }

        let to_version = versions.last().copied().unwrap_or(latest);
        Ok(MigrationReport::Applied {
            direction: Direction::Forward,
            from_version: latest,
            to_version,
            versions,
        })
    }

    async fn apply_backward(&self, latest: u64, target: u64) -> MigrationResult<MigrationReport> {
        let mut versions = Vec::new();

        for definition in self.migrations.descending() {
            let version = definition.version();
            if version > latest {
                continue;
            }
            if version <= target {
                break;
            }

            self.log_info(&format!(
                "applying backward migration {} ({})",
                version,
                definition.name()
            ));
            self.run_step(definition, Direction::Backward).await?;

            self.ledger
                .remove_from(version)
                .await
                .map_err(|e| e.in_phase(RunPhase::RemoveFrom(version)))?;
            versions.push(version);
        }

        let to_version = if versions.is_empty() {
            latest
        } else {
            self.ledger
                .latest_version()
                .await
                .map_err(|e| e.in_phase(RunPhase::ReadLatest))?
        };

        Ok(MigrationReport::Applied {
            direction: Direction::Backward,
            from_version: latest,
            to_version,
            versions,
        })
    }

    async fn run_step(&self, definition: &MigrationDefinition, direction: Direction) -> MigrationResult<()> {
        let procedure = definition
            .procedure(direction)
            .ok_or_else(|| MigrationError::MissingDirection {
                version: definition.version(),
                name: definition.name().to_string(),
                direction,
            })?;

        self.runner
            .run(procedure)
            .await
            .map_err(|e| e.at_step(definition.version(), definition.name(), direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryDatabase;
    use crate::config::MigrateOptionsBuilder;
    use crate::error::ErrorKind;
    use parking_lot::Mutex;

    fn users_migrations() -> Vec<MigrationDefinition> {
        vec![
            MigrationDefinition::new(1, "Create Users Table")
                .forward_sql("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
                .backward_sql("DROP TABLE users"),
            MigrationDefinition::new(2, "Add Email For Users")
                .forward_sql("ALTER TABLE users ADD COLUMN email TEXT")
                .backward_sql("ALTER TABLE users DROP COLUMN email"),
        ]
    }

    fn migrator(database: &MemoryDatabase, definitions: Vec<MigrationDefinition>) -> Migrator {
        Migrator::with_database(
            definitions,
            Arc::new(database.clone()),
            Arc::new(database.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_info_sink_receives_messages() {
        let database = MemoryDatabase::new();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();

        let migrator = migrator(&database, users_migrations())
            .with_info_sink(move |message| sink.lock().push(message.to_string()));
        migrator.migrate(&MigrateOptions::default()).await.unwrap();

        assert_eq!(
            *messages.lock(),
            vec![
                "applying forward migration 1 (Create Users Table)".to_string(),
                "applying forward migration 2 (Add Email For Users)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_backward_procedure_is_reported() {
        let database = MemoryDatabase::new();
        let definitions = vec![
            MigrationDefinition::new(1, "Create Users Table")
                .forward_sql("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"),
            MigrationDefinition::new(2, "Add Email For Users")
                .forward_sql("ALTER TABLE users ADD COLUMN email TEXT"),
        ];
        let migrator = migrator(&database, definitions);
        migrator.migrate(&MigrateOptions::default()).await.unwrap();

        let err = migrator
            .migrate(&MigrateOptions::to_version(1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MissingBody);
        assert_eq!(err.failed_version(), Some(2));
        assert_eq!(database.applied_versions(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_status_reports_pending_applied_and_orphaned() {
        let database = MemoryDatabase::new();
        let migrator = migrator(&database, users_migrations());

        migrator.migrate(&MigrateOptions::to_version(1)).await.unwrap();
        database.seed_ledger(7, "Dropped Feature");

        let statuses = migrator.status().await.unwrap();
        let summary: Vec<(u64, &str)> = statuses
            .iter()
            .map(|s| {
                let state = match s.state {
                    MigrationState::Pending => "pending",
                    MigrationState::Applied { .. } => "applied",
                    MigrationState::Orphaned { .. } => "orphaned",
                };
                (s.version, state)
            })
            .collect();

        assert_eq!(summary, vec![(1, "applied"), (2, "pending"), (7, "orphaned")]);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_touching_ledger() {
        let database = MemoryDatabase::new();
        let migrator = migrator(&database, users_migrations());

        let options = MigrateOptionsBuilder::refresh()
            .schemas(Vec::new())
            .build()
            .unwrap();
        let err = migrator.migrate(&options).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(database.latest_version().await.is_err());
    }
}
