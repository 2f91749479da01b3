use elif_migrate::{MigrationDefinition, SqlScript};

pub fn migration() -> MigrationDefinition {
    MigrationDefinition::new(3, "Add Address For Users")
        .forward(SqlScript::statements([
            "ALTER TABLE users ADD COLUMN address TEXT",
            "CREATE INDEX users_address_idx ON users (address)",
        ]))
        .backward(SqlScript::statements([
            "DROP INDEX IF EXISTS users_address_idx",
            "ALTER TABLE users DROP COLUMN address",
        ]))
}
