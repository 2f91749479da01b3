use async_trait::async_trait;
use elif_migrate::{ChangeProcedure, DatabaseTransaction, MigrationDefinition, StepResult};

struct AddEmail;

#[async_trait]
impl ChangeProcedure for AddEmail {
    async fn apply(&self, tx: &mut dyn DatabaseTransaction) -> StepResult {
        tx.execute("ALTER TABLE users ADD COLUMN email TEXT", &[])
            .await
            .map_err(|e| format!("failed to alter users table to add email: {}", e))?;
        Ok(())
    }
}

struct DropEmail;

#[async_trait]
impl ChangeProcedure for DropEmail {
    async fn apply(&self, tx: &mut dyn DatabaseTransaction) -> StepResult {
        tx.execute("ALTER TABLE users DROP COLUMN email", &[])
            .await
            .map_err(|e| format!("failed to drop email column for users table: {}", e))?;
        Ok(())
    }
}

pub fn migration() -> MigrationDefinition {
    MigrationDefinition::new(2, "Add Email For Users")
        .forward(AddEmail)
        .backward(DropEmail)
}
