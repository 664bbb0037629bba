use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::entities::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::error::{LedgerError, StoreError};
use crate::domain::gateways::BankClient;
use crate::domain::repository::WithdrawalExecutor;
use crate::domain::types::{IdempotencyKey, TransactionId, WalletUuid};
use crate::infrastructure::persistence::store::{NewTransaction, PgStore};

/// Implements the withdrawal state machine (spec §4.4): `schedule` books
/// the intent as `Pending`, `execute` is the critical section that the
/// dispatcher/executor pair drives to a terminal state.
pub struct WithdrawalService {
    store: Arc<PgStore>,
    bank: Arc<dyn BankClient>,
}

impl WithdrawalService {
    pub fn new(store: Arc<PgStore>, bank: Arc<dyn BankClient>) -> Self {
        Self { store, bank }
    }

    pub async fn schedule(
        &self,
        wallet_uuid: WalletUuid,
        amount: i64,
        scheduled_for: DateTime<Utc>,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(
                "amount must be positive".to_string(),
            ));
        }
        if scheduled_for <= Utc::now() {
            return Err(LedgerError::InvalidArgument(
                "scheduled_for must be in the future".to_string(),
            ));
        }

        if let Some(key) = idempotency_key {
            if let Some(existing) = self.lookup_replay(key, amount).await? {
                return Ok(existing);
            }
        }

        let wallet = self
            .store
            .find_wallet_by_uuid(wallet_uuid.0)
            .await?
            .ok_or(LedgerError::NotFound)?;

        let mut tx = self.store.begin().await?;

        let row = self
            .store
            .create_transaction(
                &mut tx,
                NewTransaction {
                    wallet_id: wallet.id,
                    amount,
                    kind: TransactionKind::Withdrawal,
                    status: TransactionStatus::Pending,
                    scheduled_for: Some(scheduled_for),
                    executed_at: None,
                    idempotency_key: idempotency_key.map(|k| k.0),
                },
            )
            .await
            .map_err(LedgerError::from)?;

        tx.commit().await.map_err(|e| LedgerError::Internal(e.to_string()))?;

        Ok(Transaction::from(row))
    }

    async fn lookup_replay(
        &self,
        key: IdempotencyKey,
        amount: i64,
    ) -> Result<Option<Transaction>, LedgerError> {
        let existing = self
            .store
            .find_transaction_by_idempotency_key(key.0)
            .await?
            .map(Transaction::from);

        if let Some(existing) = &existing {
            if existing.amount != amount {
                warn!(
                    idempotency_key = %key,
                    stored_amount = existing.amount,
                    requested_amount = amount,
                    "idempotency key replayed with mismatched amount, returning stored transaction unchanged"
                );
            }
        }

        Ok(existing)
    }
}

#[async_trait]
impl WithdrawalExecutor for WithdrawalService {
    /// The critical section of spec §4.4.2, run under a single transaction
    /// that holds both the transaction row lock and the wallet row lock for
    /// its entire duration, including the outbound bank call. A transaction
    /// already `Processing` or terminal is not pending/failed any more, so
    /// losing the initial lock is a no-op: `NotFound`, per spec §4.4.2/§4.6.
    async fn execute(&self, transaction_id: TransactionId) -> Result<Transaction, LedgerError> {
        let mut tx = self.store.begin().await?;

        let locked = self
            .store
            .lock_transaction_in_statuses(
                &mut tx,
                transaction_id.0,
                &[TransactionStatus::Pending, TransactionStatus::Failed],
            )
            .await;

        let entry = match locked {
            Ok(row) => row,
            Err(StoreError::NotFound) => {
                tx.rollback().await.map_err(|e| LedgerError::Internal(e.to_string()))?;
                return Err(LedgerError::NotFound);
            }
            Err(other) => return Err(LedgerError::from(other)),
        };

        let wallet = self.store.lock_wallet_by_id(&mut tx, entry.wallet_id).await?;
        self.store.mark_processing(&mut tx, entry.id).await?;

        let now = Utc::now();

        if wallet.balance < entry.amount {
            let row = self
                .store
                .fail_insufficient_balance(&mut tx, entry.id, now)
                .await?;
            tx.commit().await.map_err(|e| LedgerError::Internal(e.to_string()))?;
            info!(transaction_id = entry.id, "withdrawal failed: insufficient balance");
            return Ok(Transaction::from(row));
        }

        let bank_result = self
            .bank
            .request_deposit(WalletUuid(wallet.uuid), entry.amount)
            .await;

        let row = if bank_result.ok {
            self.store
                .atomic_add_balance(&mut tx, wallet.id, -entry.amount)
                .await?;
            self.store
                .complete(&mut tx, entry.id, now, bank_result.payload)
                .await?
        } else {
            self.store
                .fail_and_increment_retry(&mut tx, entry.id, now, bank_result.payload)
                .await?
        };

        tx.commit().await.map_err(|e| LedgerError::Internal(e.to_string()))?;

        let result = Transaction::from(row);
        if result.status == TransactionStatus::Failed {
            warn!(
                transaction_id = result.id.0,
                retry_count = result.retry_count,
                "withdrawal execution failed, eligible for retry below ceiling"
            );
        }
        Ok(result)
    }
}
