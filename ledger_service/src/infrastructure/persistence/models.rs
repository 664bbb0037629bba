use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::entities::{Transaction, TransactionKind, TransactionStatus, Wallet};
use crate::domain::types::{IdempotencyKey, TransactionId, WalletRowId, WalletUuid};

/// Row shape of the `wallets` table (spec §3). Mirrors `Wallet` one to one;
/// kept as a separate type so a future persistence-only column (migration
/// bookkeeping, soft-delete marker, ...) never has to leak into the domain
/// entity.
#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: i64,
    pub uuid: Uuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(r: WalletRow) -> Self {
        Self {
            id: WalletRowId(r.id),
            uuid: WalletUuid(r.uuid),
            balance: r.balance,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Row shape of the `transactions` table (spec §3).
#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub wallet_id: i64,
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub third_party_response: Option<serde_json::Value>,
    pub retry_count: i32,
    pub idempotency_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(r: TransactionRow) -> Self {
        Self {
            id: TransactionId(r.id),
            wallet_id: WalletRowId(r.wallet_id),
            amount: r.amount,
            kind: r.kind,
            status: r.status,
            scheduled_for: r.scheduled_for,
            executed_at: r.executed_at,
            third_party_response: r.third_party_response,
            retry_count: r.retry_count.max(0) as u32,
            idempotency_key: r.idempotency_key.map(IdempotencyKey),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
