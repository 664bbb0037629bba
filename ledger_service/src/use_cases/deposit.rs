use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::domain::entities::{Transaction, TransactionKind, TransactionStatus};
use crate::domain::error::LedgerError;
use crate::domain::types::{IdempotencyKey, WalletUuid};
use crate::infrastructure::persistence::store::{NewTransaction, PgStore};

/// Implements the deposit algorithm (spec §4.3): a single locked wallet
/// row, one atomic balance update, one transaction row, always `Completed`.
/// There is no external call on this path — the bank is only involved when
/// money leaves a wallet, not when it arrives.
pub struct DepositService {
    store: Arc<PgStore>,
}

impl DepositService {
    pub fn new(store: Arc<PgStore>) -> Self {
        Self { store }
    }

    pub async fn deposit(
        &self,
        wallet_uuid: WalletUuid,
        amount: i64,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(
                "amount must be positive".to_string(),
            ));
        }

        if let Some(key) = idempotency_key {
            if let Some(existing) = self.lookup_replay(key, amount).await? {
                return Ok(existing);
            }
        }

        match self.execute_once(wallet_uuid, amount, idempotency_key).await {
            Err(LedgerError::Conflict) if idempotency_key.is_some() => {
                // A concurrent writer just inserted the same key; give the
                // pre-lock lookup one more chance before giving up.
                if let Some(key) = idempotency_key {
                    if let Some(existing) = self.lookup_replay(key, amount).await? {
                        return Ok(existing);
                    }
                }
                self.execute_once(wallet_uuid, amount, idempotency_key).await
            }
            other => other,
        }
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

    async fn execute_once(
        &self,
        wallet_uuid: WalletUuid,
        amount: i64,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.store.begin().await?;

        let wallet = self.store.lock_wallet_by_uuid(&mut tx, wallet_uuid.0).await?;
        self.store.atomic_add_balance(&mut tx, wallet.id, amount).await?;

        let now = Utc::now();
        let row = self
            .store
            .create_transaction(
                &mut tx,
                NewTransaction {
                    wallet_id: wallet.id,
                    amount,
                    kind: TransactionKind::Deposit,
                    status: TransactionStatus::Completed,
                    scheduled_for: None,
                    executed_at: Some(now),
                    idempotency_key: idempotency_key.map(|k| k.0),
                },
            )
            .await
            .map_err(LedgerError::from)?;

        tx.commit().await.map_err(|e| LedgerError::Internal(e.to_string()))?;

        Ok(Transaction::from(row))
    }
}
