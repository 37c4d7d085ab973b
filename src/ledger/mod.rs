//! Ledger: accounts, entries, transfers and the transfer engine
//!
//! - [`store`]: data-access traits and the transaction runner
//! - [`postgres`]: PostgreSQL backend (sqlx)
//! - [`memory`]: in-process backend with the same locking behaviour
//! - [`transfer`]: funds transfer as one atomic unit

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
pub mod transfer;

#[cfg(test)]
mod integration_tests;

pub use error::{LedgerError, ViolationKind};
pub use memory::MemoryStore;
pub use models::{
    Account, Currency, Entry, Transfer, TransferTxParams, TransferTxResult, User,
};
pub use postgres::PgStore;
pub use store::{LedgerTx, Queries, Store, exec_tx};
pub use transfer::transfer_tx;
