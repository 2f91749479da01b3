mod migrations;

use anyhow::{Context, Result};
use clap::Parser;
use elif_migrate::{
    LedgerConfigBuilder, MigrateOptionsBuilder, MigrationState, Migrator, PostgresDatabase,
    PostgresLedger,
};
use std::io;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "elif-migrate")]
#[command(about = "Apply, revert or force versioned schema migrations")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Version of migration to run, 0 for the latest
    #[arg(long = "target-version", visible_alias = "version", default_value_t = 0)]
    target_version: u64,

    /// Set the version in the database without running any migrations
    #[arg(long)]
    force: bool,

    /// Drop and recreate the schemas first, should be set for the first run on an empty database
    #[arg(long)]
    refresh: bool,

    /// Schema to drop and recreate on refresh, may be repeated
    #[arg(long = "schema", default_value = "public")]
    schemas: Vec<String>,

    /// Table holding applied versions
    #[arg(long, default_value = "migrations")]
    ledger_table: String,

    /// Print the currently applied version and exit
    #[arg(long, conflicts_with_all = ["force", "refresh", "status"])]
    info: bool,

    /// List every migration with its state and exit
    #[arg(long, conflicts_with_all = ["force", "refresh"])]
    status: bool,

    /// Output logs and results as JSON
    #[arg(long)]
    json: bool,
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr))
            .init();
    }

    Ok(())
}

async fn print_status(migrator: &Migrator, json: bool) -> Result<()> {
    let statuses = migrator.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("Migration Status:");
    println!("================");
    if statuses.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    for status in statuses {
        let state = match status.state {
            MigrationState::Pending => "pending".to_string(),
            MigrationState::Applied { applied_at } => {
                format!("applied {}", applied_at.format("%Y-%m-%d %H:%M:%S"))
            }
            MigrationState::Orphaned { applied_at } => {
                format!("unknown, applied {}", applied_at.format("%Y-%m-%d %H:%M:%S"))
            }
        };
        println!("  {:>4}  {:<32} {}", status.version, status.name, state);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json)?;

    let database = PostgresDatabase::connect(&cli.database_url)
        .await
        .context("Failed to open database")?;
    let ledger_config = LedgerConfigBuilder::new()
        .table(cli.ledger_table.clone())
        .build()?;
    let ledger = PostgresLedger::with_config(database.pool().clone(), ledger_config)?;
    let migrator = Migrator::with_database(migrations::all(), Arc::new(database), Arc::new(ledger))?;

    if cli.status {
        return print_status(&migrator, cli.json).await;
    }

    let options = MigrateOptionsBuilder::new()
        .target_version(cli.target_version)
        .print_info_and_exit(cli.info)
        .force_version(cli.force)
        .refresh_schema(cli.refresh)
        .schemas(cli.schemas)
        .build()?;
    debug!("Running migrations with {:?}", options);

    let report = migrator.migrate(&options).await.context("Migration failed")?;
    if cli.json {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(())
}
