//! In-process ledger store
//!
//! Mirrors the PostgreSQL semantics the transfer engine depends on:
//! - ids come from per-table sequences (a rolled back insert leaves a gap)
//! - writes inside a transaction stay invisible to other handles until commit
//! - `add_account_balance` takes an exclusive row lock that is held until the
//!   transaction ends, so lock-order deadlocks behave like they would in the database
//! - foreign key, unique and check constraints are enforced on insert

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use super::error::{LedgerError, ViolationKind};
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, CreateUserParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer, User,
};
use super::store::{LedgerTx, Queries, Store};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
    user_seq: i64,
    account_seq: i64,
    entry_seq: i64,
    transfer_seq: i64,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, account_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// In-memory ledger store
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, autocommit: bool) -> MemoryTx {
        MemoryTx {
            shared: self.shared.clone(),
            staged: Staged::default(),
            locks: HashMap::new(),
            autocommit,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        Ok(Box::new(self.handle(false)))
    }

    async fn acquire(&self) -> Result<Box<dyn Queries>, LedgerError> {
        Ok(Box::new(self.handle(true)))
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Writes not yet visible outside the owning handle
#[derive(Default)]
struct Staged {
    users: Vec<User>,
    accounts: Vec<Account>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
    balance_deltas: BTreeMap<i64, i64>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.accounts.is_empty()
            && self.entries.is_empty()
            && self.transfers.is_empty()
            && self.balance_deltas.is_empty()
    }
}

/// Transaction (or autocommit handle) over a [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Shared>,
    staged: Staged,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    autocommit: bool,
}

impl MemoryTx {
    /// Account as seen by this handle: committed row or own insert, plus own deltas
    fn visible_account(&self, tables: &Tables, id: i64) -> Option<Account> {
        let mut account = tables
            .accounts
            .get(&id)
            .or_else(|| self.staged.accounts.iter().find(|a| a.id == id))
            .cloned()?;
        account.balance += self.staged.balance_deltas.get(&id).copied().unwrap_or(0);
        Some(account)
    }

    fn user_exists(&self, tables: &Tables, id: i64) -> bool {
        tables.users.contains_key(&id) || self.staged.users.iter().any(|u| u.id == id)
    }

    /// Publish staged writes atomically and release row locks
    fn apply(&mut self) -> Result<(), LedgerError> {
        let staged = std::mem::take(&mut self.staged);
        let result = if staged.is_empty() {
            Ok(())
        } else {
            let mut tables = self.shared.tables();
            publish(&mut tables, staged)
        };
        self.locks.clear();
        result
    }

    fn autoflush(&mut self) -> Result<(), LedgerError> {
        if self.autocommit { self.apply() } else { Ok(()) }
    }
}

/// Re-check unique constraints against rows committed meanwhile, then publish
fn publish(tables: &mut Tables, staged: Staged) -> Result<(), LedgerError> {
    for user in &staged.users {
        check_unique_user(tables.users.values(), &user.username, &user.email)?;
    }
    for account in &staged.accounts {
        check_unique_account(tables.accounts.values(), account.owner, account)?;
    }

    for user in staged.users {
        tables.users.insert(user.id, user);
    }
    for account in staged.accounts {
        tables.accounts.insert(account.id, account);
    }
    for entry in staged.entries {
        tables.entries.insert(entry.id, entry);
    }
    for transfer in staged.transfers {
        tables.transfers.insert(transfer.id, transfer);
    }
    for (id, delta) in staged.balance_deltas {
        if let Some(account) = tables.accounts.get_mut(&id) {
            account.balance += delta;
        }
    }
    Ok(())
}

fn check_unique_user<'a>(
    mut users: impl Iterator<Item = &'a User>,
    username: &str,
    email: &str,
) -> Result<(), LedgerError> {
    if let Some(u) = users.find(|u| u.username == username || u.email == email) {
        let constraint = if u.username == username {
            "users_username_key"
        } else {
            "users_email_key"
        };
        return Err(violation(
            ViolationKind::Unique,
            format!("duplicate key value violates unique constraint \"{constraint}\""),
        ));
    }
    Ok(())
}

fn check_unique_account<'a>(
    mut accounts: impl Iterator<Item = &'a Account>,
    owner: i64,
    candidate: &Account,
) -> Result<(), LedgerError> {
    if accounts.any(|a| a.owner == owner && a.currency == candidate.currency && a.id != candidate.id)
    {
        return Err(violation(
            ViolationKind::Unique,
            "duplicate key value violates unique constraint \"owner_currency_key\"",
        ));
    }
    Ok(())
}

fn violation(kind: ViolationKind, message: impl Into<String>) -> LedgerError {
    LedgerError::ConstraintViolation {
        kind,
        message: message.into(),
    }
}

fn page<T>(mut rows: Vec<T>, key: impl Fn(&T) -> i64, limit: i64, offset: i64) -> Vec<T> {
    rows.sort_by_key(|r| key(r));
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl Queries for MemoryTx {
    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, LedgerError> {
        let user = {
            let mut tables = self.shared.tables();
            check_unique_user(
                tables.users.values().chain(self.staged.users.iter()),
                &arg.username,
                &arg.email,
            )?;
            tables.user_seq += 1;
            let now = Utc::now();
            User {
                id: tables.user_seq,
                username: arg.username,
                hashed_password: arg.hashed_password,
                full_name: arg.full_name,
                email: arg.email,
                password_changed_at: now,
                created_at: now,
            }
        };
        self.staged.users.push(user.clone());
        self.autoflush()?;
        Ok(user)
    }

    async fn get_user(&mut self, username: &str) -> Result<User, LedgerError> {
        let tables = self.shared.tables();
        tables
            .users
            .values()
            .chain(self.staged.users.iter())
            .find(|u| u.username == username)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, LedgerError> {
        let account = {
            let mut tables = self.shared.tables();
            if !self.user_exists(&tables, arg.owner) {
                return Err(violation(
                    ViolationKind::ForeignKey,
                    "insert or update on table \"accounts\" violates foreign key constraint \"accounts_owner_fkey\"",
                ));
            }
            tables.account_seq += 1;
            let account = Account {
                id: tables.account_seq,
                owner: arg.owner,
                balance: arg.balance,
                currency: arg.currency,
                created_at: Utc::now(),
            };
            check_unique_account(
                tables.accounts.values().chain(self.staged.accounts.iter()),
                arg.owner,
                &account,
            )?;
            account
        };
        self.staged.accounts.push(account.clone());
        self.autoflush()?;
        Ok(account)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        let tables = self.shared.tables();
        self.visible_account(&tables, id)
            .ok_or(LedgerError::NotFound)
    }

    async fn list_accounts(
        &mut self,
        arg: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        let tables = self.shared.tables();
        let ids: Vec<i64> = tables
            .accounts
            .values()
            .chain(self.staged.accounts.iter())
            .filter(|a| a.owner == arg.owner)
            .map(|a| a.id)
            .collect();
        let rows: Vec<Account> = ids
            .into_iter()
            .filter_map(|id| self.visible_account(&tables, id))
            .collect();
        Ok(page(rows, |a| a.id, arg.limit, arg.offset))
    }

    async fn add_account_balance(
        &mut self,
        arg: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError> {
        {
            let tables = self.shared.tables();
            if self.visible_account(&tables, arg.id).is_none() {
                return Err(LedgerError::NotFound);
            }
        }

        if !self.locks.contains_key(&arg.id) {
            let guard = self.shared.row_lock(arg.id).lock_owned().await;
            self.locks.insert(arg.id, guard);
        }

        *self.staged.balance_deltas.entry(arg.id).or_insert(0) += arg.amount;

        let account = {
            let tables = self.shared.tables();
            self.visible_account(&tables, arg.id)
                .ok_or(LedgerError::NotFound)?
        };
        self.autoflush()?;
        Ok(account)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, LedgerError> {
        let entry = {
            let mut tables = self.shared.tables();
            if self.visible_account(&tables, arg.account_id).is_none() {
                return Err(violation(
                    ViolationKind::ForeignKey,
                    "insert or update on table \"entries\" violates foreign key constraint \"entries_account_id_fkey\"",
                ));
            }
            tables.entry_seq += 1;
            Entry {
                id: tables.entry_seq,
                account_id: arg.account_id,
                amount: arg.amount,
                created_at: Utc::now(),
            }
        };
        self.staged.entries.push(entry.clone());
        self.autoflush()?;
        Ok(entry)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        let tables = self.shared.tables();
        tables
            .entries
            .get(&id)
            .or_else(|| self.staged.entries.iter().find(|e| e.id == id))
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let tables = self.shared.tables();
        let rows: Vec<Entry> = tables
            .entries
            .values()
            .chain(self.staged.entries.iter())
            .filter(|e| e.account_id == arg.account_id)
            .cloned()
            .collect();
        Ok(page(rows, |e| e.id, arg.limit, arg.offset))
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        let transfer = {
            let mut tables = self.shared.tables();
            if arg.amount <= 0 {
                return Err(violation(
                    ViolationKind::Check,
                    "new row for relation \"transfers\" violates check constraint \"transfers_amount_check\"",
                ));
            }
            for id in [arg.from_account_id, arg.to_account_id] {
                if self.visible_account(&tables, id).is_none() {
                    return Err(violation(
                        ViolationKind::ForeignKey,
                        "insert or update on table \"transfers\" violates foreign key constraint",
                    ));
                }
            }
            tables.transfer_seq += 1;
            Transfer {
                id: tables.transfer_seq,
                from_account_id: arg.from_account_id,
                to_account_id: arg.to_account_id,
                amount: arg.amount,
                created_at: Utc::now(),
            }
        };
        self.staged.transfers.push(transfer.clone());
        self.autoflush()?;
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        let tables = self.shared.tables();
        tables
            .transfers
            .get(&id)
            .or_else(|| self.staged.transfers.iter().find(|t| t.id == id))
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let tables = self.shared.tables();
        let rows: Vec<Transfer> = tables
            .transfers
            .values()
            .chain(self.staged.transfers.iter())
            .filter(|t| {
                t.from_account_id == arg.from_account_id || t.to_account_id == arg.to_account_id
            })
            .cloned()
            .collect();
        Ok(page(rows, |t| t.id, arg.limit, arg.offset))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut tx = *self;
        tx.apply()
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        // Staged writes and row locks go away with the handle
        drop(self);
        Ok(())
    }
}
