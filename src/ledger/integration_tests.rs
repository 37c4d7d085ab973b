//! Transfer engine tests against the in-memory store
//!
//! `FaultyStore` wraps a [`MemoryStore`] and can fail the n-th write of a
//! transaction or its rollback, so every step of a transfer can be broken on purpose.
//! It also records which accounts `add_account_balance` touched, in order, and can
//! stall a transaction between its first and second increment.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::error::LedgerError;
use super::memory::MemoryStore;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, CreateUserParams, Currency, Entry, ListAccountsParams,
    ListEntriesParams, ListTransfersParams, Transfer, TransferTxParams, User,
};
use super::store::{LedgerTx, Queries, Store};
use super::transfer::transfer_tx;

#[derive(Default)]
struct Faults {
    /// 1-based index of the write that fails
    fail_write: Mutex<Option<usize>>,
    fail_rollback: Mutex<bool>,
    /// Sleep after the first balance update of each transaction
    increment_delay: Mutex<Option<Duration>>,
    /// Account ids passed to `add_account_balance`, across all transactions
    increments: Mutex<Vec<i64>>,
    begin_count: AtomicUsize,
    commit_count: AtomicUsize,
    rollback_count: AtomicUsize,
}

struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Faults>,
}

impl FaultyStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    fn set_fail_write(&self, n: Option<usize>) {
        *self.faults.fail_write.lock().unwrap() = n;
    }

    fn set_fail_rollback(&self, fail: bool) {
        *self.faults.fail_rollback.lock().unwrap() = fail;
    }

    fn set_increment_delay(&self, delay: Option<Duration>) {
        *self.faults.increment_delay.lock().unwrap() = delay;
    }

    fn take_increments(&self) -> Vec<i64> {
        std::mem::take(&mut *self.faults.increments.lock().unwrap())
    }

    fn begin_count(&self) -> usize {
        self.faults.begin_count.load(Ordering::SeqCst)
    }

    fn commit_count(&self) -> usize {
        self.faults.commit_count.load(Ordering::SeqCst)
    }

    fn rollback_count(&self) -> usize {
        self.faults.rollback_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FaultyStore {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        self.faults.begin_count.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTx {
            inner,
            faults: self.faults.clone(),
            writes: 0,
            increments: 0,
        }))
    }

    async fn acquire(&self) -> Result<Box<dyn Queries>, LedgerError> {
        self.inner.acquire().await
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        self.inner.health_check().await
    }
}

struct FaultyTx {
    inner: Box<dyn LedgerTx>,
    faults: Arc<Faults>,
    writes: usize,
    increments: usize,
}

impl FaultyTx {
    fn before_write(&mut self) -> Result<(), LedgerError> {
        self.writes += 1;
        if *self.faults.fail_write.lock().unwrap() == Some(self.writes) {
            return Err(LedgerError::Backend(format!(
                "injected failure at write {}",
                self.writes
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Queries for FaultyTx {
    async fn create_user(&mut self, arg: CreateUserParams) -> Result<User, LedgerError> {
        self.before_write()?;
        self.inner.create_user(arg).await
    }

    async fn get_user(&mut self, username: &str) -> Result<User, LedgerError> {
        self.inner.get_user(username).await
    }

    async fn create_account(&mut self, arg: CreateAccountParams) -> Result<Account, LedgerError> {
        self.before_write()?;
        self.inner.create_account(arg).await
    }

    async fn get_account(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.inner.get_account(id).await
    }

    async fn list_accounts(
        &mut self,
        arg: ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        self.inner.list_accounts(arg).await
    }

    async fn add_account_balance(
        &mut self,
        arg: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError> {
        self.before_write()?;
        let account = self.inner.add_account_balance(arg).await?;
        self.faults.increments.lock().unwrap().push(arg.id);

        self.increments += 1;
        let delay = *self.faults.increment_delay.lock().unwrap();
        if let (1, Some(delay)) = (self.increments, delay) {
            tokio::time::sleep(delay).await;
        }
        Ok(account)
    }

    async fn create_entry(&mut self, arg: CreateEntryParams) -> Result<Entry, LedgerError> {
        self.before_write()?;
        self.inner.create_entry(arg).await
    }

    async fn get_entry(&mut self, id: i64) -> Result<Entry, LedgerError> {
        self.inner.get_entry(id).await
    }

    async fn list_entries(&mut self, arg: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        self.inner.list_entries(arg).await
    }

    async fn create_transfer(
        &mut self,
        arg: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        self.before_write()?;
        self.inner.create_transfer(arg).await
    }

    async fn get_transfer(&mut self, id: i64) -> Result<Transfer, LedgerError> {
        self.inner.get_transfer(id).await
    }

    async fn list_transfers(
        &mut self,
        arg: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.inner.list_transfers(arg).await
    }
}

#[async_trait]
impl LedgerTx for FaultyTx {
    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.faults.commit_count.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.faults.rollback_count.fetch_add(1, Ordering::SeqCst);
        let fail = *self.faults.fail_rollback.lock().unwrap();
        if fail {
            // The inner transaction is still discarded when dropped
            return Err(LedgerError::Backend("injected rollback failure".to_string()));
        }
        self.inner.rollback().await
    }
}

// ========================================================================
// Helpers
// ========================================================================

async fn create_account(store: &dyn Store, username: &str, balance: i64) -> Account {
    let mut q = store.acquire().await.unwrap();
    let user = q
        .create_user(CreateUserParams {
            username: username.to_string(),
            hashed_password: "hash".to_string(),
            full_name: username.to_uppercase(),
            email: format!("{}@example.com", username),
        })
        .await
        .unwrap();
    q.create_account(CreateAccountParams {
        owner: user.id,
        balance,
        currency: Currency::Usd,
    })
    .await
    .unwrap()
}

async fn balance_of(store: &dyn Store, account_id: i64) -> i64 {
    let mut q = store.acquire().await.unwrap();
    q.get_account(account_id).await.unwrap().balance
}

async fn entries_of(store: &dyn Store, account_id: i64) -> Vec<Entry> {
    let mut q = store.acquire().await.unwrap();
    q.list_entries(ListEntriesParams {
        account_id,
        limit: 1000,
        offset: 0,
    })
    .await
    .unwrap()
}

async fn transfers_between(store: &dyn Store, a: i64, b: i64) -> Vec<Transfer> {
    let mut q = store.acquire().await.unwrap();
    q.list_transfers(ListTransfersParams {
        from_account_id: a,
        to_account_id: b,
        limit: 1000,
        offset: 0,
    })
    .await
    .unwrap()
}

fn params(from: &Account, to: &Account, amount: i64) -> TransferTxParams {
    TransferTxParams {
        from_account_id: from.id,
        to_account_id: to.id,
        amount,
    }
}

// ========================================================================
// Happy path
// ========================================================================

#[tokio::test]
async fn test_transfer_tx_moves_funds_and_records_everything() {
    let store = MemoryStore::new();
    let a = create_account(&store, "alice", 1000).await;
    let b = create_account(&store, "bob", 500).await;

    let result = transfer_tx(&store, params(&a, &b, 300)).await.unwrap();

    assert_eq!(result.transfer.from_account_id, a.id);
    assert_eq!(result.transfer.to_account_id, b.id);
    assert_eq!(result.transfer.amount, 300);
    assert_eq!(result.from_entry.account_id, a.id);
    assert_eq!(result.from_entry.amount, -300);
    assert_eq!(result.to_entry.account_id, b.id);
    assert_eq!(result.to_entry.amount, 300);
    assert_eq!(result.from_account.balance, 700);
    assert_eq!(result.to_account.balance, 800);

    let result = transfer_tx(&store, params(&a, &b, 300)).await.unwrap();
    assert_eq!(result.from_account.balance, 400);
    assert_eq!(result.to_account.balance, 1100);

    assert_eq!(balance_of(&store, a.id).await, 400);
    assert_eq!(balance_of(&store, b.id).await, 1100);
}

#[tokio::test]
async fn test_transfer_tx_result_is_readable_after_commit() {
    let store = MemoryStore::new();
    let a = create_account(&store, "alice", 100).await;
    let b = create_account(&store, "bob", 100).await;

    // Reverse direction exercises the "higher id first" branch of the result mapping
    let result = transfer_tx(&store, params(&b, &a, 40)).await.unwrap();
    assert_eq!(result.from_account.id, b.id);
    assert_eq!(result.from_account.balance, 60);
    assert_eq!(result.to_account.id, a.id);
    assert_eq!(result.to_account.balance, 140);

    let mut q = store.acquire().await.unwrap();
    assert_eq!(q.get_transfer(result.transfer.id).await.unwrap(), result.transfer);
    assert_eq!(q.get_entry(result.from_entry.id).await.unwrap(), result.from_entry);
    assert_eq!(q.get_entry(result.to_entry.id).await.unwrap(), result.to_entry);
    assert_eq!(q.get_account(b.id).await.unwrap(), result.from_account);
    assert_eq!(q.get_account(a.id).await.unwrap(), result.to_account);
}

#[tokio::test]
async fn test_transfer_tx_same_account_rejected() {
    let store = FaultyStore::new(MemoryStore::new());
    let a = create_account(&store, "alice", 100).await;

    let err = transfer_tx(&store, params(&a, &a, 10)).await.unwrap_err();
    assert!(matches!(err, LedgerError::SameAccount));
    assert_eq!(store.begin_count(), 0);
    assert_eq!(balance_of(&store, a.id).await, 100);
}

#[tokio::test]
async fn test_transfer_tx_missing_account_writes_nothing() {
    let store = MemoryStore::new();
    let a = create_account(&store, "alice", 100).await;

    let err = transfer_tx(
        &store,
        TransferTxParams {
            from_account_id: a.id,
            to_account_id: 4242,
            amount: 10,
        },
    )
    .await
    .unwrap_err();
    assert!(err.violation_kind().is_some());
    assert_eq!(balance_of(&store, a.id).await, 100);
    assert!(entries_of(&store, a.id).await.is_empty());
}

// ========================================================================
// Failure & rollback
// ========================================================================

#[tokio::test]
async fn test_failure_at_any_step_leaves_no_trace() {
    for step in 1..=5 {
        let store = FaultyStore::new(MemoryStore::new());
        let a = create_account(&store, "alice", 1000).await;
        let b = create_account(&store, "bob", 500).await;
        store.set_fail_write(Some(step));

        let err = transfer_tx(&store, params(&a, &b, 300)).await.unwrap_err();
        assert!(
            err.to_string().contains(&format!("write {}", step)),
            "step {step}: unexpected error {err}"
        );

        assert_eq!(balance_of(&store, a.id).await, 1000, "step {step}");
        assert_eq!(balance_of(&store, b.id).await, 500, "step {step}");
        assert!(entries_of(&store, a.id).await.is_empty(), "step {step}");
        assert!(entries_of(&store, b.id).await.is_empty(), "step {step}");
        assert!(transfers_between(&store, a.id, b.id).await.is_empty(), "step {step}");

        assert_eq!(store.begin_count(), 1, "step {step}: no retry expected");
        assert_eq!(store.commit_count(), 0, "step {step}");
        assert_eq!(store.rollback_count(), 1, "step {step}");
    }
}

#[tokio::test]
async fn test_failed_rollback_reports_both_errors() {
    let store = FaultyStore::new(MemoryStore::new());
    let a = create_account(&store, "alice", 1000).await;
    let b = create_account(&store, "bob", 500).await;
    store.set_fail_write(Some(4));
    store.set_fail_rollback(true);

    let err = transfer_tx(&store, params(&a, &b, 300)).await.unwrap_err();
    match &err {
        LedgerError::Rollback { source, rollback } => {
            assert!(source.to_string().contains("injected failure at write 4"));
            assert!(rollback.to_string().contains("injected rollback failure"));
        }
        other => panic!("expected rollback error, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.starts_with("tx err: "));
    assert!(msg.contains("rb err: "));

    // Nothing was committed
    assert_eq!(balance_of(&store, a.id).await, 1000);
    assert_eq!(balance_of(&store, b.id).await, 500);
    assert!(transfers_between(&store, a.id, b.id).await.is_empty());
}

#[tokio::test]
async fn test_rolled_back_transfer_releases_row_locks() {
    let store = FaultyStore::new(MemoryStore::new());
    let a = create_account(&store, "alice", 1000).await;
    let b = create_account(&store, "bob", 500).await;

    // Fail on the second balance update, after the first row lock is taken
    store.set_fail_write(Some(5));
    transfer_tx(&store, params(&a, &b, 100)).await.unwrap_err();

    store.set_fail_write(None);
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        transfer_tx(&store, params(&a, &b, 100)),
    )
    .await
    .expect("row lock leaked")
    .unwrap();
    assert_eq!(result.from_account.balance, 900);
    assert_eq!(result.to_account.balance, 600);
}

#[tokio::test]
async fn test_cancelled_transfer_rolls_back() {
    let store = MemoryStore::new();
    let a = create_account(&store, "alice", 1000).await;
    let b = create_account(&store, "bob", 500).await;
    assert!(a.id < b.id);

    // Hold the row lock of the higher id so the transfer stalls after its first increment
    let mut blocker = store.begin().await.unwrap();
    blocker
        .add_account_balance(AddAccountBalanceParams { id: b.id, amount: 0 })
        .await
        .unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), transfer_tx(&store, params(&a, &b, 300)))
            .await;
    assert!(cancelled.is_err(), "transfer should still be waiting on the row lock");
    blocker.rollback().await.unwrap();

    assert_eq!(balance_of(&store, a.id).await, 1000);
    assert_eq!(balance_of(&store, b.id).await, 500);
    assert!(entries_of(&store, a.id).await.is_empty());
    assert!(transfers_between(&store, a.id, b.id).await.is_empty());

    // The lock on the lower id went away with the dropped scope
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        transfer_tx(&store, params(&a, &b, 300)),
    )
    .await
    .expect("row lock leaked")
    .unwrap();
    assert_eq!(result.from_account.balance, 700);
}

// ========================================================================
// Concurrency
// ========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_same_direction() {
    let store = Arc::new(MemoryStore::new());
    let a = create_account(store.as_ref(), "alice", 1000).await;
    let b = create_account(store.as_ref(), "bob", 1000).await;

    let n = 5;
    let amount = 10;
    let mut handles = Vec::new();
    for _ in 0..n {
        let store = store.clone();
        let arg = params(&a, &b, amount);
        handles.push(tokio::spawn(async move {
            transfer_tx(store.as_ref(), arg).await
        }));
    }

    let mut seen = std::collections::HashSet::new();
    for h in handles {
        let result = h.await.unwrap().unwrap();

        let diff_from = a.balance - result.from_account.balance;
        let diff_to = result.to_account.balance - b.balance;
        assert_eq!(diff_from, diff_to);
        assert!(diff_from > 0);
        assert_eq!(diff_from % amount, 0);

        // Every transfer observed a distinct serialized state
        let k = diff_from / amount;
        assert!((1..=n).contains(&k));
        assert!(seen.insert(k));
    }

    assert_eq!(balance_of(store.as_ref(), a.id).await, 1000 - n * amount);
    assert_eq!(balance_of(store.as_ref(), b.id).await, 1000 + n * amount);
}

#[tokio::test]
async fn test_balances_updated_in_account_id_order() {
    let store = FaultyStore::new(MemoryStore::new());
    let low = create_account(&store, "alice", 1000).await;
    let high = create_account(&store, "bob", 1000).await;
    assert!(low.id < high.id);

    // Both directions: from < to and from > to
    for (from, to) in [(&low, &high), (&high, &low)] {
        let result = transfer_tx(&store, params(from, to, 10)).await.unwrap();
        assert_eq!(store.take_increments(), vec![low.id, high.id]);

        assert_eq!(result.from_account.id, from.id);
        assert_eq!(result.to_account.id, to.id);
        assert_eq!(result.from_entry.account_id, from.id);
        assert_eq!(result.to_entry.account_id, to.id);
    }

    assert_eq!(balance_of(&store, low.id).await, 1000);
    assert_eq!(balance_of(&store, high.id).await, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let a = create_account(store.as_ref(), "alice", 1000).await;
    let b = create_account(store.as_ref(), "bob", 1000).await;

    // Each transaction holds its first row lock for a while before taking the
    // second, so the A->B and B->A tasks overlap on both rows
    store.set_increment_delay(Some(Duration::from_millis(20)));

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        let arg = if i % 2 == 0 {
            params(&a, &b, 10)
        } else {
            params(&b, &a, 10)
        };
        handles.push(tokio::spawn(async move {
            transfer_tx(store.as_ref(), arg).await
        }));
    }

    let all = async {
        for h in handles {
            h.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), all)
        .await
        .expect("transfers deadlocked");

    assert_eq!(store.commit_count(), 20);
    assert_eq!(balance_of(store.as_ref(), a.id).await, 1000);
    assert_eq!(balance_of(store.as_ref(), b.id).await, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_money_is_conserved_and_matches_entries() {
    let store = Arc::new(MemoryStore::new());
    let accounts = vec![
        create_account(store.as_ref(), "alice", 500).await,
        create_account(store.as_ref(), "bob", 300).await,
        create_account(store.as_ref(), "carol", 200).await,
    ];

    let mut handles = Vec::new();
    for i in 0..30usize {
        let store = store.clone();
        let from = &accounts[i % 3];
        let to = &accounts[(i + 1 + i / 3 % 2) % 3];
        let arg = params(from, to, (i as i64 % 7) + 1);
        handles.push(tokio::spawn(async move {
            transfer_tx(store.as_ref(), arg).await
        }));
    }

    let all = async {
        for h in handles {
            h.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), all)
        .await
        .expect("transfers deadlocked");

    let mut total = 0;
    for account in &accounts {
        let balance = balance_of(store.as_ref(), account.id).await;
        let entry_sum: i64 = entries_of(store.as_ref(), account.id)
            .await
            .iter()
            .map(|e| e.amount)
            .sum();
        assert_eq!(balance - account.balance, entry_sum);
        total += balance;
    }
    assert_eq!(total, 1000);
}
