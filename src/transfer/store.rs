//! Transfer storage seams
//!
//! A [`TransferUnit`] is one local ACID transaction: account rows locked for
//! update, balance mutations and the transaction row either all commit or
//! none do. Dropping a unit without committing rolls it back.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::TransferError;
use super::state::TransactionStatus;
use super::types::{
    AccountStats, PageRequest, TransactionFilter, TransactionId, TransactionPage,
    TransactionRecord,
};
use crate::account::{Account, AccountId};

/// Factory for transfer units plus transaction-log reads
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Begin a new local transaction
    async fn begin(&self) -> Result<Box<dyn TransferUnit>, TransferError>;

    /// Persist a `failed` audit row outside any unit
    ///
    /// Used after a post-authorization failure rolled the unit back.
    async fn insert_failed(&self, record: &TransactionRecord) -> Result<(), TransferError>;

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    async fn account_stats(&self, account_id: AccountId) -> Result<AccountStats, TransferError>;

    /// Filtered page of transactions ordered by `created_at` descending
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<TransactionPage, TransferError>;
}

/// One local atomic unit of work
#[async_trait]
pub trait TransferUnit: Send {
    /// Lock account rows for exclusive update in ascending id order.
    ///
    /// Duplicate ids are locked once. Unknown ids are absent from the result.
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, TransferError>;

    /// Add `delta` to a locked account's balance and return the new balance.
    ///
    /// Fails if the result would be negative.
    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, TransferError>;

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), TransferError>;

    /// CAS status update: returns false if the current status is not `expected`
    async fn update_status_if(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> Result<bool, TransferError>;

    async fn commit(self: Box<Self>) -> Result<(), TransferError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransferError>;
}

/// Global lock acquisition order: ascending, deduplicated
pub fn lock_order(ids: &[AccountId]) -> Vec<AccountId> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
