//! Transaction runner - executes one change procedure inside one transaction

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::database::TransactionalDatabase;
use crate::definition::ChangeProcedure;
use crate::error::{MigrationError, MigrationResult, TransactionPhase};

/// Runs a change procedure atomically
///
/// Either every effect of the procedure is committed or none is visible
/// outside the transaction.
#[async_trait]
pub trait TransactionRunner: Send + Sync {
    /// Run the procedure once inside a fresh transaction
    async fn run(&self, procedure: &dyn ChangeProcedure) -> MigrationResult<()>;
}

/// Runner opening one transaction per call on a [`TransactionalDatabase`]
#[derive(Clone)]
pub struct ScopedTransactionRunner {
    database: Arc<dyn TransactionalDatabase>,
}

impl ScopedTransactionRunner {
    /// Create a new runner over the given database
    pub fn new(database: Arc<dyn TransactionalDatabase>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl TransactionRunner for ScopedTransactionRunner {
    async fn run(&self, procedure: &dyn ChangeProcedure) -> MigrationResult<()> {
        let mut transaction = self
            .database
            .begin()
            .await
            .map_err(|e| MigrationError::transaction(TransactionPhase::Begin, e, None))?;
        debug!("Transaction started");

        match procedure.apply(transaction.as_mut()).await {
            Ok(()) => match transaction.commit().await {
                Ok(()) => {
                    debug!("Transaction committed");
                    Ok(())
                }
                Err(commit_err) => {
                    warn!("Commit failed, rolling back: {}", commit_err);
                    let rollback = transaction.rollback().await.err();
                    if let Some(rollback_err) = &rollback {
                        error!("Failed to rollback after failed commit: {}", rollback_err);
                    }
                    Err(MigrationError::transaction(
                        TransactionPhase::Commit,
                        commit_err,
                        rollback,
                    ))
                }
            },
            Err(body_err) => {
                warn!("Migration body failed, rolling back: {}", body_err);
                let rollback = transaction.rollback().await.err();
                if let Some(rollback_err) = &rollback {
                    error!("Failed to rollback after failed migration body: {}", rollback_err);
                }
                Err(MigrationError::Body {
                    source: body_err,
                    rollback: rollback.map(Box::new),
                })
            }
        }
    }
}
