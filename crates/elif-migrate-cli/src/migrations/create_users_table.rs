use elif_migrate::MigrationDefinition;

pub fn migration() -> MigrationDefinition {
    MigrationDefinition::new(1, "Create Users Table")
        .forward_sql("CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL)")
        .backward_sql("DROP TABLE users")
}
