use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{IdempotencyKey, TransactionId, WalletRowId, WalletUuid};

/// A single-currency balance account addressable by uuid (spec §3).
///
/// `balance` is a count of minor currency units and must never go negative
/// at a committed state — that invariant is enforced by the locking
/// discipline in `Store`/`WithdrawalService`, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletRowId,
    pub uuid: WalletUuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn has_sufficient_balance(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// An append-only record of one credit or debit attempt against a wallet
/// (spec §3). Instances are always snapshots returned by `Store` — there is
/// no in-memory mutation path, every transition is a single `UPDATE ...
/// RETURNING` issued against the locked row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletRowId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub third_party_response: Option<serde_json::Value>,
    pub retry_count: u32,
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Entry states valid for `WithdrawalService::execute` per the state
    /// machine in spec §4.4.2: `Pending`, or `Failed` still below the retry
    /// ceiling. The `Store`'s row lock enforces `Pending`/`Failed` alone;
    /// this additionally captures the retry-ceiling half of the rule, used
    /// by `ListFailedRetryable` and by tests of the state machine itself.
    pub fn is_retry_eligible(&self, max_retries: u32) -> bool {
        self.kind == TransactionKind::Withdrawal
            && self.status == TransactionStatus::Failed
            && self.retry_count < max_retries
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.kind == TransactionKind::Withdrawal
            && self.status == TransactionStatus::Pending
            && self.scheduled_for.is_some_and(|t| t <= now)
    }

    /// True once no further automatic processing will ever touch this row:
    /// `Completed`, a failed deposit (deposits never retry), or a failed
    /// withdrawal that has exhausted its retry ceiling.
    pub fn is_terminal(&self, max_retries: u32) -> bool {
        match self.status {
            TransactionStatus::Completed => true,
            TransactionStatus::Failed => {
                self.kind == TransactionKind::Deposit || !self.is_retry_eligible(max_retries)
            }
            TransactionStatus::Pending | TransactionStatus::Processing => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn base_tx(status: TransactionStatus, retry_count: u32) -> Transaction {
        Transaction {
            id: TransactionId(1),
            wallet_id: WalletRowId(1),
            amount: 1_000,
            kind: TransactionKind::Withdrawal,
            status,
            scheduled_for: Some(Utc::now()),
            executed_at: None,
            third_party_response: None,
            retry_count,
            idempotency_key: Some(IdempotencyKey(Uuid::new_v4())),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn failed_below_ceiling_is_retry_eligible() {
        let tx = base_tx(TransactionStatus::Failed, 2);
        assert!(tx.is_retry_eligible(3));
    }

    #[test]
    fn failed_at_ceiling_is_not_retry_eligible() {
        let tx = base_tx(TransactionStatus::Failed, 3);
        assert!(!tx.is_retry_eligible(3));
    }

    #[test]
    fn pending_is_never_retry_eligible() {
        let tx = base_tx(TransactionStatus::Pending, 0);
        assert!(!tx.is_retry_eligible(3));
    }

    #[test]
    fn due_requires_pending_and_past_schedule() {
        let mut tx = base_tx(TransactionStatus::Pending, 0);
        tx.scheduled_for = Some(Utc::now() - chrono::Duration::minutes(1));
        assert!(tx.is_due(Utc::now()));

        tx.scheduled_for = Some(Utc::now() + chrono::Duration::minutes(1));
        assert!(!tx.is_due(Utc::now()));
    }

    #[test]
    fn completed_is_terminal() {
        let tx = base_tx(TransactionStatus::Completed, 0);
        assert!(tx.is_terminal(3));
    }

    #[test]
    fn failed_withdrawal_below_ceiling_is_not_terminal() {
        let tx = base_tx(TransactionStatus::Failed, 1);
        assert!(!tx.is_terminal(3));
    }

    #[test]
    fn failed_withdrawal_at_ceiling_is_terminal() {
        let tx = base_tx(TransactionStatus::Failed, 3);
        assert!(tx.is_terminal(3));
    }

    #[test]
    fn failed_deposit_is_always_terminal() {
        let mut tx = base_tx(TransactionStatus::Failed, 0);
        tx.kind = TransactionKind::Deposit;
        assert!(tx.is_terminal(3));
    }

    #[test]
    fn wallet_balance_sufficiency() {
        let wallet = Wallet {
            id: WalletRowId(1),
            uuid: WalletUuid::new(),
            balance: 5_000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(wallet.has_sufficient_balance(5_000));
        assert!(!wallet.has_sufficient_balance(5_001));
    }
}
