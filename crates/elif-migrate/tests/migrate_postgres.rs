//! Runs against a real PostgreSQL server when `TEST_DATABASE_URL` is set

use elif_migrate::{
    ErrorKind, LedgerConfigBuilder, MigrateOptions, MigrateOptionsBuilder, MigrationDefinition,
    MigrationState, Migrator, PostgresDatabase, PostgresLedger,
};
use sqlx::PgPool;
use std::sync::Arc;

const SCHEMA: &str = "elif_migrate_test";

async fn connect() -> Option<PgPool> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        }
    };
    Some(PgPool::connect(&database_url).await.expect("Failed to connect to test database"))
}

fn users_migrations() -> Vec<MigrationDefinition> {
    vec![
        MigrationDefinition::new(1, "Create Users Table")
            .forward_sql(format!(
                "CREATE TABLE {}.users (id SERIAL PRIMARY KEY, name TEXT NOT NULL)",
                SCHEMA
            ))
            .backward_sql(format!("DROP TABLE {}.users", SCHEMA)),
        MigrationDefinition::new(2, "Add Email For Users")
            .forward_sql(format!("ALTER TABLE {}.users ADD COLUMN email TEXT", SCHEMA))
            .backward_sql(format!("ALTER TABLE {}.users DROP COLUMN email", SCHEMA)),
        MigrationDefinition::new(3, "Add Address For Users")
            .forward_sql(format!("ALTER TABLE {}.users ADD COLUMN address TEXT", SCHEMA))
            .backward_sql(format!("ALTER TABLE {}.users DROP COLUMN address", SCHEMA)),
    ]
}

async fn column_exists(pool: &PgPool, column: &str) -> bool {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = 'users' AND column_name = $2)",
    )
    .bind(SCHEMA)
    .bind(column)
    .fetch_one(pool)
    .await
    .expect("Failed to query information_schema")
}

#[tokio::test]
async fn test_postgres_full_cycle() {
    let Some(pool) = connect().await else {
        return;
    };

    let config = LedgerConfigBuilder::new()
        .schema(Some(SCHEMA.to_string()))
        .build()
        .unwrap();
    let ledger = PostgresLedger::with_config(pool.clone(), config).unwrap();
    let migrator = Migrator::with_database(
        users_migrations(),
        Arc::new(PostgresDatabase::new(pool.clone())),
        Arc::new(ledger),
    )
    .unwrap();

    let refresh = MigrateOptionsBuilder::refresh()
        .schemas(vec![SCHEMA.to_string()])
        .build()
        .unwrap();
    let report = migrator.migrate(&refresh).await.unwrap();
    assert_eq!(report.versions(), &[1, 2, 3]);
    assert!(column_exists(&pool, "address").await);

    let report = migrator.migrate(&MigrateOptions::to_version(1)).await.unwrap();
    assert_eq!(report.versions(), &[3, 2]);
    assert!(!column_exists(&pool, "email").await);

    let statuses = migrator.status().await.unwrap();
    assert!(matches!(statuses[0].state, MigrationState::Applied { .. }));
    assert_eq!(statuses[1].state, MigrationState::Pending);

    migrator
        .migrate(&MigrateOptionsBuilder::force(3).build().unwrap())
        .await
        .unwrap();
    let report = migrator
        .migrate(&MigrateOptionsBuilder::info().build().unwrap())
        .await
        .unwrap();
    assert_eq!(report.current_version(), 3);
    assert!(!column_exists(&pool, "address").await);

    let err = migrator
        .migrate(&MigrateOptionsBuilder::force(9).build().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionNotFound);

    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", SCHEMA))
        .execute(&pool)
        .await
        .unwrap();
}
