//! PostgreSQL ledger store
//!
//! `PgQueries` runs the ledger statements against any PostgreSQL connection:
//! a pooled connection (autocommit) or an open `sqlx::Transaction`.

use std::ops::DerefMut;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};

use super::error::LedgerError;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, CreateUserParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer, User,
};
use super::store::{LedgerTx, Queries, Store};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";
const USER_COLUMNS: &str =
    "id, username, hashed_password, full_name, email, password_changed_at, created_at";

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgQueries::new(tx)))
    }

    async fn acquire(&self) -> Result<Box<dyn Queries>, LedgerError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgQueries::new(conn)))
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Ledger statements over one PostgreSQL connection
pub struct PgQueries<C> {
    conn: C,
}

impl<C> PgQueries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> Queries for PgQueries<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, hashed_password, full_name, email)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&arg.username)
        .bind(&arg.hashed_password)
        .bind(&arg.full_name)
        .bind(&arg.email)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&mut self, username: &str) -> Result<User, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 LIMIT 1"
        ))
        .bind(username)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_user(&row)
    }

    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO accounts (owner, balance, currency)
             VALUES ($1, $2, $3)
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(arg.owner)
        .bind(arg.balance)
        .bind(arg.currency.code())
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    async fn list_accounts(
        &mut self,
        arg: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE owner = $1
             ORDER BY id
             LIMIT $2 OFFSET $3"
        ))
        .bind(arg.owner)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn add_account_balance(
        &mut self,
        arg: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = balance + $1
             WHERE id = $2
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(arg.amount)
        .bind(arg.id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_account(&row)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO entries (account_id, amount)
             VALUES ($1, $2)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(arg.account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_entry(&row)
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_entry(&row)
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries
             WHERE account_id = $1
             ORDER BY id
             LIMIT $2 OFFSET $3"
        ))
        .bind(arg.account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        let row = sqlx::query(&format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount)
             VALUES ($1, $2, $3)
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.amount)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_transfer(&row)
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await?;

        row_to_transfer(&row)
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers
             WHERE from_account_id = $1 OR to_account_id = $2
             ORDER BY id
             LIMIT $3 OFFSET $4"
        ))
        .bind(arg.from_account_id)
        .bind(arg.to_account_id)
        .bind(arg.limit)
        .bind(arg.offset)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.iter().map(row_to_transfer).collect()
    }
}

#[async_trait]
impl LedgerTx for PgQueries<Transaction<'static, Postgres>> {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let PgQueries { conn } = *self;
        conn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let PgQueries { conn } = *self;
        conn.rollback().await?;
        Ok(())
    }
}

fn row_to_user(row: &PgRow) -> Result<User, LedgerError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        hashed_password: row.try_get("hashed_password")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        password_changed_at: row.try_get("password_changed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_account(row: &PgRow) -> Result<Account, LedgerError> {
    let currency: String = row.try_get("currency")?;
    let currency = currency.parse().map_err(LedgerError::Backend)?;

    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        currency,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<Entry, LedgerError> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, LedgerError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}
