//! Ledger data-access contract
//!
//! - [`Queries`]: point reads, paginated lists, inserts and the atomic balance
//!   increment. Usable inside a transaction ([`LedgerTx`]) or on an autocommit
//!   handle ([`Store::acquire`]).
//! - [`Store`]: hands out transactions and autocommit handles.
//! - [`exec_tx`]: the only way to run several writes atomically. Commits when the
//!   closure returns `Ok`, rolls back when it returns `Err`.

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::error::LedgerError;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, CreateUserParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer, User,
};

#[async_trait]
pub trait Queries: Send {
    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, LedgerError>;

    async fn get_user(&mut self, username: &str) -> Result<User, LedgerError>;

    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, LedgerError>;

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError>;

    /// Accounts of one owner ordered by id
    async fn list_accounts(&mut self, arg: ListAccountsParams)
    -> Result<Vec<Account>, LedgerError>;

    /// `balance = balance + amount` as a single store-level statement.
    ///
    /// Takes the row lock on the account; inside a transaction the lock is held
    /// until commit or rollback.
    async fn add_account_balance(
        &mut self,
        arg: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError>;

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, LedgerError>;

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError>;

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    async fn create_transfer(&mut self, arg: CreateTransferParams)
    -> Result<Transfer, LedgerError>;

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;
}

/// An open atomic scope. Dropping it without `commit` discards every write.
#[async_trait]
pub trait LedgerTx: Queries {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Human readable backend name for logs
    fn name(&self) -> &'static str;

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError>;

    /// Handle whose writes take effect immediately
    async fn acquire(&self) -> Result<Box<dyn Queries>, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}

/// Run `f` inside one transaction.
///
/// If `f` fails the transaction is rolled back and its error returned unchanged.
/// A failing rollback is reported together with the original error.
pub async fn exec_tx<S, T, F>(store: &S, f: F) -> Result<T, LedgerError>
where
    S: Store + ?Sized,
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn LedgerTx) -> BoxFuture<'t, Result<T, LedgerError>> + Send,
{
    let mut tx = store.begin().await?;
    let outcome = f(tx.as_mut()).await;

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                tracing::error!(error = %err, rollback_error = %rollback_err, "Rollback failed");
                Err(LedgerError::Rollback {
                    source: Box::new(err),
                    rollback: Box::new(rollback_err),
                })
            }
        },
    }
}
