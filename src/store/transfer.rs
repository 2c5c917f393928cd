//! Funds-transfer orchestration
//!
//! The business algorithm of the service: one transfer row, two entry rows
//! and two balance adjustments, all inside a single unit of work. The
//! orchestrator keeps no state of its own; every invocation is a one-shot
//! transition that either commits in full or rolls back in full.

use serde::{Deserialize, Serialize};

use super::models::{Account, Entry, Transfer};
use super::{LedgerUnit, StoreError};

/// Input for one transfer. `amount` is in minor currency units and must be
/// strictly positive. `from_account_id == to_account_id` is legal: the
/// balance nets to a no-op but the audit rows are still written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

/// Everything a committed transfer produced, with both accounts as they
/// stand after the balance updates.
#[derive(Debug, Clone, Serialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_entry: Entry,
    pub to_entry: Entry,
    pub from_account: Account,
    pub to_account: Account,
}

/// Pre-unit argument check. Runs before any unit of work is opened, so a
/// rejected amount has no side effects at all.
pub fn validate(params: &TransferParams) -> Result<(), StoreError> {
    if params.amount <= 0 {
        return Err(StoreError::InvalidAmount(params.amount));
    }
    Ok(())
}

/// Runs the transfer steps against an open unit of work.
///
/// Any error here makes the coordinator roll the whole unit back, so the
/// paired entry/transfer rows and the balance updates can never be observed
/// separately.
pub(crate) async fn execute<U: LedgerUnit>(
    unit: &mut U,
    params: TransferParams,
) -> Result<TransferTxResult, StoreError> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer = unit
        .create_transfer(from_account_id, to_account_id, amount)
        .await?;
    let from_entry = unit.create_entry(from_account_id, -amount).await?;
    let to_entry = unit.create_entry(to_account_id, amount).await?;

    // add_account_balance takes the row lock and holds it until commit.
    // Adjusting the lower account id first gives every transfer the same
    // acquisition order, so two transfers moving money in opposite
    // directions between one account pair cannot each hold one lock and
    // wait on the other. Ids are i64; if they ever become non-orderable a
    // byte-wise total order has to replace this comparison.
    let (from_account, to_account) = if from_account_id == to_account_id {
        unit.add_account_balance(from_account_id, -amount).await?;
        let account = unit.add_account_balance(to_account_id, amount).await?;
        (account.clone(), account)
    } else if from_account_id < to_account_id {
        let from_account = unit.add_account_balance(from_account_id, -amount).await?;
        let to_account = unit.add_account_balance(to_account_id, amount).await?;
        (from_account, to_account)
    } else {
        let to_account = unit.add_account_balance(to_account_id, amount).await?;
        let from_account = unit.add_account_balance(from_account_id, -amount).await?;
        (from_account, to_account)
    };

    // The returned row was read under its lock, so this check cannot race
    // with another transfer's debit.
    if from_account.balance < 0 {
        return Err(StoreError::InsufficientBalance {
            account_id: from_account_id,
            balance: from_account.balance + amount,
            requested: amount,
        });
    }

    Ok(TransferTxResult {
        transfer,
        from_entry,
        to_entry,
        from_account,
        to_account,
    })
}
