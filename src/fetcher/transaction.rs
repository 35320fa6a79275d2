//! Scoped transactions around message processing.
//!
//! The host application supplies a [`TransactionManager`] for its storage.
//! [`with_transaction`] commits when the processing succeeds and rolls back
//! on any error, so a failed message leaves no partial effects behind.

use std::future::Future;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{BoxError, QueueFetcherError};

/// An open transaction. Consumed by either commit or rollback.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), BoxError>;

    async fn rollback(self: Box<Self>) -> Result<(), BoxError>;
}

/// Opens transactions on the host application's storage.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BoxError>;
}

/// A manager for applications without transactional storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

struct NoopTransaction;

#[async_trait]
impl Transaction for NoopTransaction {
    async fn commit(self: Box<Self>) -> Result<(), BoxError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), BoxError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for NoTransactions {
    async fn begin(&self) -> Result<Box<dyn Transaction>, BoxError> {
        Ok(Box::new(NoopTransaction))
    }
}

/// Runs `f` inside a transaction.
///
/// Commits if `f` succeeds and rolls back if it fails. A failed commit is
/// returned as [`QueueFetcherError::Transaction`]; a failed rollback is
/// logged and the original error is returned.
pub async fn with_transaction<M, F, Fut, T>(manager: &M, f: F) -> Result<T, QueueFetcherError>
where
    M: TransactionManager + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, QueueFetcherError>>,
{
    let transaction = manager
        .begin()
        .await
        .map_err(QueueFetcherError::Transaction)?;

    match f().await {
        Ok(value) => {
            transaction
                .commit()
                .await
                .map_err(QueueFetcherError::Transaction)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(error = %rollback_error, "Transaction rollback failed");
            }
            Err(e)
        }
    }
}
