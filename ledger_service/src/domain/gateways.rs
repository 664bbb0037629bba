use async_trait::async_trait;

use crate::domain::types::WalletUuid;

/// Outcome of a single bank call (spec §4.2). Always a value, never an
/// exception — the executor persists it verbatim into
/// `third_party_response` and branches on `ok` to decide whether to
/// compensate.
#[derive(Debug, Clone, PartialEq)]
pub struct BankResult {
    pub ok: bool,
    pub payload: serde_json::Value,
}

/// The only outbound collaborator `WithdrawalService` talks to. A trait so
/// tests can substitute a `mockall` mock instead of making a real HTTP call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BankClient: Send + Sync {
    async fn request_deposit(&self, wallet_uuid: WalletUuid, amount: i64) -> BankResult;
}
