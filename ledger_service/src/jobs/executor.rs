use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::entities::TransactionStatus;
use crate::domain::repository::WithdrawalExecutor;
use crate::domain::types::TransactionId;

/// Spawns the pool of workers draining the shared dispatch queue (spec
/// §4.6). Workers exit once the queue is both empty and closed, which is
/// what lets shutdown drain in-flight work instead of abandoning it
/// mid-transaction — the same intent as Celery's `acks_late` in the
/// original system, achieved here by simply dropping the sender first and
/// letting `recv` return `None` once every queued item is gone.
pub fn spawn<E>(
    workers: usize,
    receiver: mpsc::Receiver<TransactionId>,
    executor: Arc<E>,
) -> Vec<JoinHandle<()>>
where
    E: WithdrawalExecutor + 'static,
{
    let receiver = Arc::new(Mutex::new(receiver));
    (0..workers)
        .map(|worker_id| {
            let receiver = receiver.clone();
            let executor = executor.clone();
            tokio::spawn(async move { worker_loop(worker_id, receiver, executor).await })
        })
        .collect()
}

async fn worker_loop<E>(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TransactionId>>>,
    executor: Arc<E>,
) where
    E: WithdrawalExecutor + 'static,
{
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(transaction_id) = next else {
            info!(worker_id, "dispatch queue closed, worker exiting");
            break;
        };

        match executor.execute(transaction_id).await {
            Ok(tx) if tx.status == TransactionStatus::Completed => {
                info!(worker_id, transaction_id = tx.id.0, "withdrawal completed");
            }
            Ok(tx) if tx.status == TransactionStatus::Failed => {
                warn!(
                    worker_id,
                    transaction_id = tx.id.0,
                    retry_count = tx.retry_count,
                    "withdrawal failed"
                );
            }
            Ok(tx) => {
                info!(
                    worker_id,
                    transaction_id = tx.id.0,
                    status = ?tx.status,
                    "withdrawal left unchanged, already handled by another worker"
                );
            }
            Err(err) => {
                error!(
                    worker_id,
                    transaction_id = transaction_id.0,
                    error = %err,
                    "withdrawal execution errored"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Transaction, TransactionKind};
    use crate::domain::error::LedgerError;
    use crate::domain::repository::MockWithdrawalExecutor;
    use crate::domain::types::WalletRowId;
    use chrono::Utc;

    fn sample_transaction(id: i64, status: TransactionStatus) -> Transaction {
        Transaction {
            id: TransactionId(id),
            wallet_id: WalletRowId(1),
            amount: 1_000,
            kind: TransactionKind::Withdrawal,
            status,
            scheduled_for: None,
            executed_at: None,
            third_party_response: None,
            retry_count: 0,
            idempotency_key: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn worker_pool_drains_the_queue_and_exits_once_closed() {
        let mut mock = MockWithdrawalExecutor::new();
        mock.expect_execute()
            .withf(|id| *id == TransactionId(42))
            .returning(|_| Ok(sample_transaction(42, TransactionStatus::Completed)));

        let (tx, rx) = mpsc::channel(8);
        let handles = spawn(1, rx, Arc::new(mock));

        tx.send(TransactionId(42)).await.unwrap();
        drop(tx);

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn a_failing_execute_does_not_stop_the_worker() {
        let mut mock = MockWithdrawalExecutor::new();
        mock.expect_execute()
            .times(2)
            .returning(|id| {
                if id == TransactionId(1) {
                    Err(LedgerError::NotFound)
                } else {
                    Ok(sample_transaction(id.0, TransactionStatus::Completed))
                }
            });

        let (tx, rx) = mpsc::channel(8);
        let handles = spawn(1, rx, Arc::new(mock));

        tx.send(TransactionId(1)).await.unwrap();
        tx.send(TransactionId(2)).await.unwrap();
        drop(tx);

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
