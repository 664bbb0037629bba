use thiserror::Error;

/// Errors raised by `Store`. Anything not explicitly classified surfaces as
/// `Internal` — see spec §4.1.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("idempotency key already in use")]
    Conflict,

    #[error("transient database error: {0}")]
    Transient(String),

    #[error("internal database error: {0}")]
    Internal(String),
}

/// Service-level error kinds (spec §7). `IdempotentReplay` is deliberately
/// absent: it is an internal signal handled by returning the prior
/// transaction, never surfaced as an error.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("bank rejected the request: {0}")]
    BankRejection(serde_json::Value),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("transient failure, retry the operation")]
    Transient,

    #[error("idempotency key race, retry the write")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LedgerError::NotFound,
            StoreError::Conflict => LedgerError::Conflict,
            StoreError::Transient(_) => LedgerError::Transient,
            StoreError::Internal(msg) => LedgerError::Internal(msg),
        }
    }
}
