//! In-memory store
//!
//! Implements every storage seam ([`AccountStore`], [`TransferStore`],
//! [`NotificationStore`]) without a database. Used by `--standalone` mode
//! and by the test suites.
//!
//! Each account sits behind its own `tokio::sync::Mutex`; a [`MemoryUnit`]
//! holds the owned guards of the rows it locked until commit or rollback, so
//! it gives the same exclusion as `SELECT ... FOR UPDATE`. Mutations are
//! staged in the unit and only applied on commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::account::{Account, AccountId, AccountRole, AccountStore};
use crate::money::to_money_scale;
use crate::notification::{
    AttemptUpdate, NotificationError, NotificationId, NotificationRecord, NotificationStatus,
    NotificationStore,
};
use crate::transfer::store::lock_order;
use crate::transfer::{
    AccountStats, PageRequest, TransactionFilter, TransactionId, TransactionPage,
    TransactionRecord, TransactionStatus, TransferError, TransferStore, TransferUnit,
};

type AccountCell = Arc<AsyncMutex<Account>>;

#[derive(Default)]
struct Inner {
    accounts: RwLock<BTreeMap<AccountId, AccountCell>>,
    next_account_id: AtomicI64,
    transactions: Mutex<BTreeMap<TransactionId, TransactionRecord>>,
    notifications: Mutex<BTreeMap<NotificationId, NotificationRecord>>,
    fail_next_commit: AtomicBool,
}

/// Poison-tolerant lock
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account and return its id (ids start at 1)
    pub fn seed_account(
        &self,
        name: &str,
        email: &str,
        role: AccountRole,
        balance: Decimal,
    ) -> AccountId {
        let id = AccountId(self.inner.next_account_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let account = Account {
            id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            balance: to_money_scale(balance),
            created_at: now,
            updated_at: now,
        };

        let mut accounts = match self.inner.accounts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.insert(id, Arc::new(AsyncMutex::new(account)));
        id
    }

    /// Make the next [`TransferUnit::commit`] fail
    #[cfg(test)]
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn cell(&self, id: AccountId) -> Option<AccountCell> {
        let accounts = match self.inner.accounts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.get(&id).cloned()
    }

    fn cells(&self) -> Vec<AccountCell> {
        let accounts = match self.inner.accounts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.values().cloned().collect()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, TransferError> {
        match self.cell(id) {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Account>, TransferError> {
        let mut out = Vec::new();
        for cell in self.cells() {
            out.push(cell.lock().await.clone());
        }
        Ok(out)
    }
}

/// One in-memory unit of work
pub struct MemoryUnit {
    store: MemoryStore,
    locked: BTreeMap<AccountId, OwnedMutexGuard<Account>>,
    balances: BTreeMap<AccountId, Decimal>,
    transactions: BTreeMap<TransactionId, TransactionRecord>,
}

impl MemoryUnit {
    fn view(&self, id: AccountId) -> Option<Account> {
        let guard = self.locked.get(&id)?;
        let mut account = (**guard).clone();
        if let Some(balance) = self.balances.get(&id) {
            account.balance = *balance;
        }
        Some(account)
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn TransferUnit>, TransferError> {
        Ok(Box::new(MemoryUnit {
            store: self.clone(),
            locked: BTreeMap::new(),
            balances: BTreeMap::new(),
            transactions: BTreeMap::new(),
        }))
    }

    async fn insert_failed(&self, record: &TransactionRecord) -> Result<(), TransferError> {
        let mut transactions = lock(&self.inner.transactions);
        if transactions.contains_key(&record.id) {
            return Err(TransferError::PersistenceFailure(format!(
                "Duplicate transaction id: {}",
                record.id
            )));
        }
        transactions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        Ok(lock(&self.inner.transactions).get(&id).cloned())
    }

    async fn account_stats(&self, account_id: AccountId) -> Result<AccountStats, TransferError> {
        let transactions = lock(&self.inner.transactions);
        let mut stats = AccountStats::default();
        for tx in transactions.values() {
            stats.accumulate(account_id, tx);
        }
        Ok(stats)
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<TransactionPage, TransferError> {
        let transactions = lock(&self.inner.transactions);
        let mut matching: Vec<&TransactionRecord> =
            transactions.values().filter(|tx| filter.matches(tx)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .cloned()
            .collect();
        Ok(TransactionPage::new(data, total, page))
    }
}

#[async_trait]
impl TransferUnit for MemoryUnit {
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, TransferError> {
        let mut out = Vec::with_capacity(ids.len());

        for id in lock_order(ids) {
            if !self.locked.contains_key(&id) {
                let Some(cell) = self.store.cell(id) else {
                    continue;
                };
                let guard = cell.lock_owned().await;
                self.locked.insert(id, guard);
            }
            if let Some(account) = self.view(id) {
                out.push(account);
            }
        }

        Ok(out)
    }

    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, TransferError> {
        let current = self
            .view(id)
            .ok_or_else(|| {
                TransferError::PersistenceFailure(format!("Account {} is not locked", id))
            })?
            .balance;

        let next = current + delta;
        if next < Decimal::ZERO {
            return Err(TransferError::PersistenceFailure(format!(
                "Balance update rejected for account {}",
                id
            )));
        }

        self.balances.insert(id, next);
        Ok(next)
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), TransferError> {
        let exists = self.transactions.contains_key(&record.id)
            || lock(&self.store.inner.transactions).contains_key(&record.id);
        if exists {
            return Err(TransferError::PersistenceFailure(format!(
                "Duplicate transaction id: {}",
                record.id
            )));
        }
        self.transactions.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_status_if(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> Result<bool, TransferError> {
        if !expected.can_transition_to(new) {
            return Ok(false);
        }

        let current = match self.transactions.get(&id) {
            Some(record) => Some(record.clone()),
            None => lock(&self.store.inner.transactions).get(&id).cloned(),
        };

        match current {
            Some(record) if record.status == expected => {
                self.transactions.insert(id, record.with_status(new));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        let mut unit = *self;
        if unit.store.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(TransferError::PersistenceFailure(
                "Injected commit failure".to_string(),
            ));
        }

        let now = Utc::now();
        for (id, balance) in std::mem::take(&mut unit.balances) {
            if let Some(guard) = unit.locked.get_mut(&id) {
                guard.balance = balance;
                guard.updated_at = now;
            }
        }

        let staged = std::mem::take(&mut unit.transactions);
        lock(&unit.store.inner.transactions).extend(staged);

        // Guards drop here, releasing the row locks
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<NotificationRecord, NotificationError> {
        let mut notifications = lock(&self.inner.notifications);
        if let Some(existing) = notifications.values().find(|n| {
            n.transaction_id == record.transaction_id && n.recipient_id == record.recipient_id
        }) {
            return Ok(existing.clone());
        }
        notifications.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>, NotificationError> {
        Ok(lock(&self.inner.notifications).get(&id).cloned())
    }

    async fn record_attempt(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        update: &AttemptUpdate,
    ) -> Result<bool, NotificationError> {
        let mut notifications = lock(&self.inner.notifications);
        match notifications.get_mut(&id) {
            Some(n) if n.status == NotificationStatus::Pending && n.attempts == previous_attempts => {
                *n = n.after_attempt(update);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(NotificationError::NotFound(id)),
        }
    }

    async fn mark_due(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, NotificationError> {
        let mut notifications = lock(&self.inner.notifications);
        match notifications.get_mut(&id) {
            Some(n) if n.status == NotificationStatus::Pending && n.attempts == previous_attempts => {
                n.next_attempt_at = Some(at);
                n.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(NotificationError::NotFound(id)),
        }
    }

    async fn notifications_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        let notifications = lock(&self.inner.notifications);
        Ok(notifications
            .values()
            .filter(|n| n.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn find_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, NotificationError> {
        let notifications = lock(&self.inner.notifications);
        let mut pending: Vec<_> = notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|n| n.next_attempt_at);
        pending.truncate(limit);
        Ok(pending)
    }
}
