use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::PgPool;

use ledger_service::domain::entities::TransactionStatus;
use ledger_service::domain::error::LedgerError;
use ledger_service::domain::gateways::{BankClient, BankResult};
use ledger_service::domain::repository::WithdrawalExecutor;
use ledger_service::domain::types::WalletUuid;
use ledger_service::infrastructure::persistence::store::PgStore;
use ledger_service::use_cases::deposit::DepositService;
use ledger_service::use_cases::withdrawal::WithdrawalService;

struct FakeBankClient {
    accept: AtomicBool,
}

impl FakeBankClient {
    fn accepting() -> Self {
        Self {
            accept: AtomicBool::new(true),
        }
    }

    fn rejecting() -> Self {
        Self {
            accept: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BankClient for FakeBankClient {
    async fn request_deposit(&self, _wallet_uuid: WalletUuid, amount: i64) -> BankResult {
        if self.accept.load(Ordering::SeqCst) {
            BankResult {
                ok: true,
                payload: json!({ "confirmation": "ok", "amount": amount }),
            }
        } else {
            BankResult {
                ok: false,
                payload: json!({ "error": "bank declined" }),
            }
        }
    }
}

async fn seed_wallet(store: &PgStore, deposit: &DepositService, opening_balance: i64) -> WalletUuid {
    let row = store.create_wallet().await.expect("create wallet");
    let uuid = WalletUuid(row.uuid);
    if opening_balance > 0 {
        deposit
            .deposit(uuid, opening_balance, None)
            .await
            .expect("seed deposit");
    }
    uuid
}

#[sqlx::test]
async fn deposit_credits_wallet_and_creates_completed_transaction(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());

    let wallet = store.create_wallet().await.unwrap();
    let uuid = WalletUuid(wallet.uuid);

    let tx = deposit.deposit(uuid, 5_000, None).await.unwrap();

    assert_eq!(tx.amount, 5_000);
    assert_eq!(tx.status, TransactionStatus::Completed);

    let refreshed = store.find_wallet_by_uuid(wallet.uuid).await.unwrap().unwrap();
    assert_eq!(refreshed.balance, 5_000);
}

#[sqlx::test]
async fn deposit_replay_with_same_idempotency_key_returns_stored_transaction(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());

    let wallet = store.create_wallet().await.unwrap();
    let uuid = WalletUuid(wallet.uuid);
    let key = ledger_service::domain::types::IdempotencyKey(uuid::Uuid::new_v4());

    let first = deposit.deposit(uuid, 1_000, Some(key)).await.unwrap();
    let second = deposit.deposit(uuid, 1_000, Some(key)).await.unwrap();

    assert_eq!(first.id, second.id);

    let refreshed = store.find_wallet_by_uuid(wallet.uuid).await.unwrap().unwrap();
    assert_eq!(refreshed.balance, 1_000, "replay must not double-credit");
}

#[sqlx::test]
async fn scheduled_withdrawal_starts_pending(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());
    let bank = Arc::new(FakeBankClient::accepting());
    let withdrawal = WithdrawalService::new(store.clone(), bank);

    let uuid = seed_wallet(&store, &deposit, 10_000).await;
    let tx = withdrawal
        .schedule(uuid, 2_000, Utc::now() + ChronoDuration::minutes(5), None)
        .await
        .unwrap();

    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.amount, 2_000);
}

#[sqlx::test]
async fn execute_succeeds_and_debits_wallet(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());
    let bank = Arc::new(FakeBankClient::accepting());
    let withdrawal = WithdrawalService::new(store.clone(), bank);

    let uuid = seed_wallet(&store, &deposit, 10_000).await;
    let scheduled = withdrawal
        .schedule(uuid, 3_000, Utc::now() - ChronoDuration::seconds(1), None)
        .await
        .unwrap();

    let executed = withdrawal.execute(scheduled.id).await.unwrap();

    assert_eq!(executed.status, TransactionStatus::Completed);

    let wallet = store
        .find_wallet_by_uuid(uuid.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(wallet.balance, 7_000);
}

#[sqlx::test]
async fn execute_with_insufficient_balance_fails_without_touching_balance(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());
    let bank = Arc::new(FakeBankClient::accepting());
    let withdrawal = WithdrawalService::new(store.clone(), bank);

    let uuid = seed_wallet(&store, &deposit, 1_000).await;
    let scheduled = withdrawal
        .schedule(uuid, 5_000, Utc::now() - ChronoDuration::seconds(1), None)
        .await
        .unwrap();

    let executed = withdrawal.execute(scheduled.id).await.unwrap();

    assert_eq!(executed.status, TransactionStatus::Failed);
    assert_eq!(executed.retry_count, 0, "insufficient balance never counts as a retry");

    let wallet = store.find_wallet_by_uuid(uuid.0).await.unwrap().unwrap();
    assert_eq!(wallet.balance, 1_000);
}

#[sqlx::test]
async fn execute_with_bank_rejection_increments_retry_count(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());
    let bank = Arc::new(FakeBankClient::rejecting());
    let withdrawal = WithdrawalService::new(store.clone(), bank);

    let uuid = seed_wallet(&store, &deposit, 10_000).await;
    let scheduled = withdrawal
        .schedule(uuid, 2_000, Utc::now() - ChronoDuration::seconds(1), None)
        .await
        .unwrap();

    let executed = withdrawal.execute(scheduled.id).await.unwrap();

    assert_eq!(executed.status, TransactionStatus::Failed);
    assert_eq!(executed.retry_count, 1);

    let wallet = store.find_wallet_by_uuid(uuid.0).await.unwrap().unwrap();
    assert_eq!(wallet.balance, 10_000, "a rejected debit must not move funds");
}

#[sqlx::test]
async fn executing_an_already_completed_transaction_is_not_found(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let deposit = DepositService::new(store.clone());
    let bank = Arc::new(FakeBankClient::accepting());
    let withdrawal = WithdrawalService::new(store.clone(), bank);

    let uuid = seed_wallet(&store, &deposit, 10_000).await;
    let scheduled = withdrawal
        .schedule(uuid, 1_000, Utc::now() - ChronoDuration::seconds(1), None)
        .await
        .unwrap();

    let first = withdrawal.execute(scheduled.id).await.unwrap();
    assert_eq!(first.status, TransactionStatus::Completed);

    let second = withdrawal.execute(scheduled.id).await;
    assert!(
        matches!(second, Err(LedgerError::NotFound)),
        "re-executing a terminal withdrawal must be a no-op that reports NotFound"
    );

    let wallet = store.find_wallet_by_uuid(uuid.0).await.unwrap().unwrap();
    assert_eq!(wallet.balance, 9_000, "re-executing a completed withdrawal must not debit twice");
}
