//! Transfer transaction engine
//!
//! One transfer = one transaction:
//!
//! ```text
//! BEGIN
//!   INSERT transfer {from, to, amount}
//!   INSERT entry    {from, -amount}
//!   INSERT entry    {to,   +amount}
//!   UPDATE accounts SET balance = balance + delta   -- lower account id first
//!   UPDATE accounts SET balance = balance + delta   -- higher account id second
//! COMMIT
//! ```
//!
//! Callers have already checked existence, currency, ownership and balance.
//! Balance updates always lock the lower account id first, so two transfers over
//! the same pair of accounts never wait on each other in a cycle.

use tracing::{debug, instrument};

use super::error::LedgerError;
use super::models::{
    Account, AddAccountBalanceParams, CreateEntryParams, CreateTransferParams, TransferTxParams,
    TransferTxResult,
};
use super::store::{LedgerTx, Store, exec_tx};

/// Move `amount` from one account to another atomically
#[instrument(
    skip(store, arg),
    fields(
        store = store.name(),
        from_account_id = arg.from_account_id,
        to_account_id = arg.to_account_id,
        amount = arg.amount,
    )
)]
pub async fn transfer_tx<S>(store: &S, arg: TransferTxParams) -> Result<TransferTxResult, LedgerError>
where
    S: Store + ?Sized,
{
    // Both increments would target the same row; reject before touching the store
    if arg.from_account_id == arg.to_account_id {
        return Err(LedgerError::SameAccount);
    }

    let result = exec_tx(store, move |tx| Box::pin(apply_transfer(tx, arg))).await?;

    debug!(transfer_id = result.transfer.id, "Transfer committed");
    Ok(result)
}

/// The five writes of a transfer, issued on an already open transaction
pub async fn apply_transfer(
    tx: &mut dyn LedgerTx,
    arg: TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    let transfer = tx
        .create_transfer(CreateTransferParams {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let from_entry = tx
        .create_entry(CreateEntryParams {
            account_id: arg.from_account_id,
            amount: -arg.amount,
        })
        .await?;

    let to_entry = tx
        .create_entry(CreateEntryParams {
            account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let [first, second] = lock_order(&arg);
    let delta = |id: i64| {
        if id == arg.from_account_id {
            -arg.amount
        } else {
            arg.amount
        }
    };
    let (account1, account2) =
        add_money(tx, (first, delta(first)), (second, delta(second))).await?;
    let (from_account, to_account) = if account1.id == arg.from_account_id {
        (account1, account2)
    } else {
        (account2, account1)
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Apply two `(account_id, delta)` increments in the given order
async fn add_money(
    tx: &mut dyn LedgerTx,
    first: (i64, i64),
    second: (i64, i64),
) -> Result<(Account, Account), LedgerError> {
    let account1 = tx
        .add_account_balance(AddAccountBalanceParams {
            id: first.0,
            amount: first.1,
        })
        .await?;

    let account2 = tx
        .add_account_balance(AddAccountBalanceParams {
            id: second.0,
            amount: second.1,
        })
        .await?;

    Ok((account1, account2))
}

/// Order in which a transfer locks its two accounts
pub fn lock_order(arg: &TransferTxParams) -> [i64; 2] {
    if arg.from_account_id < arg.to_account_id {
        [arg.from_account_id, arg.to_account_id]
    } else {
        [arg.to_account_id, arg.from_account_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_order_ignores_direction() {
        let forward = TransferTxParams {
            from_account_id: 3,
            to_account_id: 9,
            amount: 1,
        };
        let backward = TransferTxParams {
            from_account_id: 9,
            to_account_id: 3,
            amount: 1,
        };
        assert_eq!(lock_order(&forward), [3, 9]);
        assert_eq!(lock_order(&forward), lock_order(&backward));
    }
}
