use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::entities::{TransactionKind, TransactionStatus};
use crate::domain::error::StoreError;
use crate::domain::repository::DispatchStore;
use crate::domain::types::TransactionId;
use crate::infrastructure::persistence::models::{TransactionRow, WalletRow};

/// A transaction handle borrowed from `PgStore::begin`. `'static` because
/// `sqlx::Pool::begin` hands out a transaction that owns its connection,
/// which is what lets it be threaded through `DepositService`/
/// `WithdrawalService` without fighting the borrow checker.
pub type PgTx = sqlx::Transaction<'static, Postgres>;

fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) => {
            let code = db.code().unwrap_or_default();
            if code == "23505" {
                StoreError::Conflict
            } else if code == "40001" || code == "40P01" {
                StoreError::Transient(err.to_string())
            } else {
                StoreError::Internal(err.to_string())
            }
        }
        _ => StoreError::Internal(err.to_string()),
    }
}

pub struct NewTransaction {
    pub wallet_id: i64,
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<Uuid>,
}

/// Postgres-backed implementation of `Store` (spec §4.1). Deliberately a
/// concrete struct rather than a trait object: the entire point of this
/// type is the specific row-locking protocol used by `WithdrawalService`,
/// which isn't something callers should be able to swap out.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<PgTx, StoreError> {
        self.pool.begin().await.map_err(classify)
    }

    pub async fn create_wallet(&self) -> Result<WalletRow, StoreError> {
        sqlx::query_as::<_, WalletRow>(
            r#"INSERT INTO wallets (uuid, balance) VALUES ($1, 0) RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    pub async fn find_wallet_by_uuid(&self, uuid: Uuid) -> Result<Option<WalletRow>, StoreError> {
        sqlx::query_as::<_, WalletRow>(r#"SELECT * FROM wallets WHERE uuid = $1"#)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    /// `LockWalletByUUID` (spec §4.1): exclusive row lock, `NotFound` if absent.
    pub async fn lock_wallet_by_uuid(
        &self,
        tx: &mut PgTx,
        uuid: Uuid,
    ) -> Result<WalletRow, StoreError> {
        sqlx::query_as::<_, WalletRow>(r#"SELECT * FROM wallets WHERE uuid = $1 FOR UPDATE"#)
            .bind(uuid)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)
    }

    /// `LockWalletByID` (spec §4.1).
    pub async fn lock_wallet_by_id(&self, tx: &mut PgTx, id: i64) -> Result<WalletRow, StoreError> {
        sqlx::query_as::<_, WalletRow>(r#"SELECT * FROM wallets WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify)?
            .ok_or(StoreError::NotFound)
    }

    /// `LockTransactionInStatuses` (spec §4.1) — the at-most-once guard.
    /// Returns `NotFound` if the row's current status isn't one of
    /// `statuses`, which is exactly what makes a second concurrent executor
    /// lose the race against the first.
    pub async fn lock_transaction_in_statuses(
        &self,
        tx: &mut PgTx,
        id: i64,
        statuses: &[TransactionStatus],
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"SELECT * FROM transactions WHERE id = $1 AND status = ANY($2) FOR UPDATE"#,
        )
        .bind(id)
        .bind(statuses)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .ok_or(StoreError::NotFound)
    }

    /// `AtomicAddBalance` (spec §4.1): a single `UPDATE balance = balance +
    /// $delta`, never a read-modify-write in application memory. `delta`
    /// may be negative; the caller must have validated sufficiency under
    /// the same lock before calling this.
    pub async fn atomic_add_balance(
        &self,
        tx: &mut PgTx,
        wallet_id: i64,
        delta: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE wallets SET balance = balance + $1, updated_at = now() WHERE id = $2"#,
        )
        .bind(delta)
        .bind(wallet_id)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn find_transaction_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<TransactionRow>, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"SELECT * FROM transactions WHERE idempotency_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    pub async fn find_transaction_by_id(
        &self,
        wallet_id: i64,
        id: i64,
    ) -> Result<Option<TransactionRow>, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"SELECT * FROM transactions WHERE id = $1 AND wallet_id = $2"#,
        )
        .bind(id)
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    pub async fn list_transactions_for_wallet(
        &self,
        wallet_id: i64,
        status: Option<TransactionStatus>,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<TransactionRow>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM transactions WHERE wallet_id = ");
        builder.push_bind(wallet_id);

        if let Some(status) = status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(kind) = kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind);
        }
        builder.push(" ORDER BY created_at DESC");

        builder
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    pub async fn create_transaction(
        &self,
        tx: &mut PgTx,
        new: NewTransaction,
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                wallet_id, amount, kind, status, scheduled_for, executed_at,
                retry_count, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
            RETURNING *
            "#,
        )
        .bind(new.wallet_id)
        .bind(new.amount)
        .bind(new.kind)
        .bind(new.status)
        .bind(new.scheduled_for)
        .bind(new.executed_at)
        .bind(new.idempotency_key)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify)
    }

    /// Step 3 of `Execute` (spec §4.4.2): `Pending`/`Failed` → `Processing`.
    pub async fn mark_processing(
        &self,
        tx: &mut PgTx,
        id: i64,
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions SET status = $1, updated_at = now()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(TransactionStatus::Processing)
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify)
    }

    /// Step 5 of `Execute`: insufficient balance, terminal `Failed`,
    /// `retry_count` untouched.
    pub async fn fail_insufficient_balance(
        &self,
        tx: &mut PgTx,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $1, executed_at = $2,
                third_party_response = $3, updated_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(TransactionStatus::Failed)
        .bind(now)
        .bind(serde_json::json!({"error": "Insufficient balance"}))
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify)
    }

    /// Step 8 of `Execute`: bank accepted the debit.
    pub async fn complete(
        &self,
        tx: &mut PgTx,
        id: i64,
        now: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $1, executed_at = $2,
                third_party_response = $3, updated_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(TransactionStatus::Completed)
        .bind(now)
        .bind(payload)
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify)
    }

    /// Step 9 of `Execute`: bank rejected, connection failed, or timed out.
    /// `retry_count = retry_count + 1` computed at the database — the
    /// "deferred column update" idiom (spec §9) — never read-modify-write
    /// in application memory.
    pub async fn fail_and_increment_retry(
        &self,
        tx: &mut PgTx,
        id: i64,
        now: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Result<TransactionRow, StoreError> {
        sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $1, executed_at = $2, retry_count = retry_count + 1,
                third_party_response = $3, updated_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(TransactionStatus::Failed)
        .bind(now)
        .bind(payload)
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(classify)
    }
}

#[async_trait]
impl DispatchStore for PgStore {
    async fn list_due_pending_withdrawals(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransactionId>, StoreError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM transactions
            WHERE kind = $1 AND status = $2 AND scheduled_for <= $3
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(TransactionKind::Withdrawal)
        .bind(TransactionStatus::Pending)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(ids.into_iter().map(|(id,)| TransactionId(id)).collect())
    }

    async fn list_failed_retryable(
        &self,
        max_retries: u32,
    ) -> Result<Vec<TransactionId>, StoreError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM transactions
            WHERE kind = $1 AND status = $2 AND retry_count < $3
            ORDER BY updated_at ASC
            "#,
        )
        .bind(TransactionKind::Withdrawal)
        .bind(TransactionStatus::Failed)
        .bind(max_retries as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(ids.into_iter().map(|(id,)| TransactionId(id)).collect())
    }
}
