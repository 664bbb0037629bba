//! Identifier newtypes shared by every layer of the ledger service.
//!
//! Kept in their own crate so persistence, domain and API code all bind the
//! same concrete types instead of passing `Uuid`/`i64` around untyped.

pub mod ids;
