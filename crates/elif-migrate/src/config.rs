//! Migration options and ledger configuration

use serde::{Deserialize, Serialize};
use service_builder::builder;

use crate::error::{MigrationError, MigrationResult};

/// Options for one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct MigrateOptions {
    /// Version to reach; 0 means the highest known version
    #[builder(default = "0", getter)]
    pub target_version: u64,

    /// Report the applied version and exit without mutating anything
    #[builder(default = "false", getter)]
    pub print_info_and_exit: bool,

    /// Record `target_version` in the ledger without running any migration body
    #[builder(default = "false", getter)]
    pub force_version: bool,

    /// Drop and recreate `schemas` before migrating
    #[builder(default = "false", getter)]
    pub refresh_schema: bool,

    /// Scopes dropped and recreated when `refresh_schema` is set
    #[builder(default = "vec![\"public\".to_string()]", getter)]
    pub schemas: Vec<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            target_version: 0,
            print_info_and_exit: false,
            force_version: false,
            refresh_schema: false,
            schemas: vec!["public".to_string()],
        }
    }
}

impl MigrateOptions {
    /// Options migrating to the given version
    pub fn to_version(version: u64) -> Self {
        Self {
            target_version: version,
            ..Default::default()
        }
    }

    /// Check the options once, before a run touches the database
    pub fn validate(&self) -> MigrationResult<()> {
        if self.refresh_schema {
            if self.schemas.is_empty() {
                return Err(MigrationError::Configuration(
                    "refresh requested without any schema to reset".to_string(),
                ));
            }
            if self.schemas.iter().any(|s| s.trim().is_empty()) {
                return Err(MigrationError::Configuration(
                    "schema names cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl MigrateOptionsBuilder {
    /// Options that only report the applied version
    pub fn info() -> Self {
        MigrateOptionsBuilder::new().print_info_and_exit(true)
    }

    /// Options recording `version` in the ledger without running bodies
    pub fn force(version: u64) -> Self {
        MigrateOptionsBuilder::new()
            .target_version(version)
            .force_version(true)
    }

    /// Options dropping and recreating `public` before migrating to the latest version
    pub fn refresh() -> Self {
        MigrateOptionsBuilder::new().refresh_schema(true)
    }
}

/// Where the ledger is stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct LedgerConfig {
    /// Table name for tracking migrations
    #[builder(default = "\"migrations\".to_string()", getter)]
    pub table: String,

    /// Schema holding the table; unqualified when absent
    #[builder(default, getter)]
    pub schema: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
            schema: None,
        }
    }
}

impl LedgerConfig {
    /// Quoted, optionally schema-qualified table name
    pub fn qualified_table(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.table)),
            None => quote_identifier(&self.table),
        }
    }

    pub fn validate(&self) -> MigrationResult<()> {
        if self.table.trim().is_empty() {
            return Err(MigrationError::Configuration(
                "ledger table name cannot be empty".to_string(),
            ));
        }
        if matches!(&self.schema, Some(schema) if schema.trim().is_empty()) {
            return Err(MigrationError::Configuration(
                "ledger schema name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
