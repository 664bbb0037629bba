use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::error::StoreError;
use crate::domain::types::TransactionId;

/// The read-only, non-locking slice of `Store` the Dispatcher depends on
/// (spec §4.5). Split out as its own port — unlike the transactional
/// locking operations in `Store`, these two queries have no lock semantics
/// to get wrong, so they are worth mocking in isolation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn list_due_pending_withdrawals(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransactionId>, StoreError>;

    async fn list_failed_retryable(
        &self,
        max_retries: u32,
    ) -> Result<Vec<TransactionId>, StoreError>;
}

/// The single operation the Executor Worker Pool depends on (spec §4.6).
/// Implemented by `WithdrawalService`; split out so the pool's retry/backoff
/// behavior can be tested against a mock instead of a live database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WithdrawalExecutor: Send + Sync {
    async fn execute(
        &self,
        transaction_id: TransactionId,
    ) -> Result<crate::domain::entities::Transaction, crate::domain::error::LedgerError>;
}
