//! simple_bank - Banking backend
//!
//! Accounts, entries and atomic funds transfers over HTTP.
//!
//! # Modules
//!
//! - [`ledger`] - Ledger rows, store contract, PostgreSQL and in-memory stores, transfer engine
//! - [`token`] - Access tokens (JWT, encrypted local tokens)
//! - [`user_auth`] - Password hashing, registration, login, bearer middleware
//! - [`gateway`] - HTTP API (axum)
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing setup

pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod token;
pub mod user_auth;

// Convenient re-exports at crate root
pub use ledger::{
    Account, Currency, Entry, LedgerError, MemoryStore, PgStore, Store, Transfer,
    TransferTxParams, TransferTxResult, transfer_tx,
};
pub use token::{Payload, TokenError, TokenMaker};
