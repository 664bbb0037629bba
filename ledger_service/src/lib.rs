//! Wallet ledger core.
//!
//! `domain` holds the entities, errors and ports; `infrastructure` holds the
//! Postgres store and the outbound bank client; `use_cases` holds the two
//! services (`DepositService`, `WithdrawalService`); `jobs` holds the
//! dispatcher loops and the executor worker pool; `api` is the thin HTTP
//! adapter over all of the above.

pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod use_cases;
