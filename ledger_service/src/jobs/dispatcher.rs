use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::domain::repository::DispatchStore;
use crate::domain::types::TransactionId;

/// Scans for work on a fixed interval and pushes matching transaction ids
/// onto the shared queue the executor worker pool drains (spec §4.5).
/// Neither loop locks rows or mutates state — all of that happens inside
/// `WithdrawalExecutor::execute`.
pub struct Dispatcher<S> {
    store: Arc<S>,
    max_retries: u32,
    queue: mpsc::Sender<TransactionId>,
}

impl<S: DispatchStore + 'static> Dispatcher<S> {
    pub fn new(store: Arc<S>, max_retries: u32, queue: mpsc::Sender<TransactionId>) -> Self {
        Self {
            store,
            max_retries,
            queue,
        }
    }

    /// `DueLoop`: picks up `Pending` withdrawals whose `scheduled_for` has
    /// passed.
    pub async fn run_due_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan_due().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("due loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// `RetryLoop`: picks up `Failed` withdrawals still below the retry
    /// ceiling.
    pub async fn run_retry_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan_retryable().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retry loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn scan_due(&self) {
        match self.store.list_due_pending_withdrawals(Utc::now()).await {
            Ok(ids) => self.enqueue(ids).await,
            Err(err) => error!(error = %err, "due scan failed"),
        }
    }

    async fn scan_retryable(&self) {
        match self.store.list_failed_retryable(self.max_retries).await {
            Ok(ids) => self.enqueue(ids).await,
            Err(err) => error!(error = %err, "retry scan failed"),
        }
    }

    async fn enqueue(&self, ids: Vec<TransactionId>) {
        for id in ids {
            if self.queue.send(id).await.is_err() {
                error!("dispatch queue closed, dropping remaining work for this scan");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::MockDispatchStore;

    #[tokio::test]
    async fn scan_due_enqueues_ids_returned_by_the_store() {
        let mut store = MockDispatchStore::new();
        store
            .expect_list_due_pending_withdrawals()
            .returning(|_| Ok(vec![TransactionId(1), TransactionId(2)]));

        let (tx, mut rx) = mpsc::channel(8);
        let dispatcher = Dispatcher::new(Arc::new(store), 5, tx);

        dispatcher.scan_due().await;

        assert_eq!(rx.recv().await, Some(TransactionId(1)));
        assert_eq!(rx.recv().await, Some(TransactionId(2)));
    }

    #[tokio::test]
    async fn scan_retryable_passes_the_configured_ceiling_through() {
        let mut store = MockDispatchStore::new();
        store
            .expect_list_failed_retryable()
            .withf(|max_retries| *max_retries == 3)
            .returning(|_| Ok(vec![TransactionId(7)]));

        let (tx, mut rx) = mpsc::channel(8);
        let dispatcher = Dispatcher::new(Arc::new(store), 3, tx);

        dispatcher.scan_retryable().await;

        assert_eq!(rx.recv().await, Some(TransactionId(7)));
    }

    #[tokio::test]
    async fn scan_errors_are_swallowed_not_propagated() {
        let mut store = MockDispatchStore::new();
        store
            .expect_list_due_pending_withdrawals()
            .returning(|_| Err(crate::domain::error::StoreError::Internal("boom".to_string())));

        let (tx, mut rx) = mpsc::channel(8);
        let dispatcher = Dispatcher::new(Arc::new(store), 5, tx);

        dispatcher.scan_due().await;
        drop(dispatcher);

        assert_eq!(rx.recv().await, None, "a failed scan must enqueue nothing");
    }
}
