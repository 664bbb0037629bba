pub use common::ids::{IdempotencyKey, TransactionId, WalletRowId, WalletUuid};
