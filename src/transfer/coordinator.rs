//! Transfer Coordinator
//!
//! Runs one transfer end to end inside a single [`TransferUnit`]:
//!
//! ```text
//! begin ─▶ lock(payer, payee) ─▶ preconditions ─▶ authorize
//!                                                    │
//!       rollback ◀── any failure ──────────────────┤
//!                                                    ▼
//!       debit ─▶ credit ─▶ insert PENDING ─▶ CAS COMPLETED ─▶ commit
//!                                                              │
//!                          notify payee + invalidate cache ◀──┘
//! ```
//!
//! Preconditions fail in a fixed order: account existence, payer role,
//! self-transfer, amount, balance. A failure after authorization rolls the
//! unit back and leaves a `failed` audit row.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::state::TransactionStatus;
use super::store::{TransferStore, TransferUnit};
use super::types::{
    AccountStats, PageRequest, TransactionFilter, TransactionId, TransactionPage,
    TransactionRecord, TransferRequest,
};
use crate::account::{Account, AccountId};
use crate::authorizer::Authorizer;
use crate::cache::CacheInvalidator;
use crate::money::{default_max_amount, validate_amount};
use crate::notification::{NotificationDispatcher, transfer_message};

/// Locked accounts that passed every local precondition
struct Checked {
    payer: Account,
    payee: Account,
    amount: Decimal,
}

/// Transfer Coordinator - exclusive writer of balances and transaction rows
pub struct TransferCoordinator {
    store: Arc<dyn TransferStore>,
    authorizer: Arc<dyn Authorizer>,
    notifications: Arc<NotificationDispatcher>,
    cache: Arc<dyn CacheInvalidator>,
    max_amount: Decimal,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn TransferStore>,
        authorizer: Arc<dyn Authorizer>,
        notifications: Arc<NotificationDispatcher>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            store,
            authorizer,
            notifications,
            cache,
            max_amount: default_max_amount(),
        }
    }

    /// Override the per-transfer amount ceiling
    pub fn with_max_amount(mut self, max_amount: Decimal) -> Self {
        self.max_amount = max_amount;
        self
    }

    pub fn max_amount(&self) -> Decimal {
        self.max_amount
    }

    /// Move `req.amount` from payer to payee.
    ///
    /// Returns the `completed` record. Notification and cache failures after
    /// the commit are logged and never fail the transfer.
    pub async fn transfer(&self, req: TransferRequest) -> Result<TransactionRecord, TransferError> {
        let started = Instant::now();
        let mut unit = self.store.begin().await?;

        let checked = match self.check_preconditions(unit.as_mut(), &req).await {
            Ok(checked) => checked,
            Err(e) => {
                self.abort(unit).await;
                warn!(
                    payer_id = %req.payer_id,
                    payee_id = %req.payee_id,
                    code = e.code(),
                    "Transfer rejected: {}", e
                );
                return Err(e);
            }
        };

        if let Err(e) = self.authorize(&req).await {
            self.abort(unit).await;
            return Err(e);
        }

        let pending = TransactionRecord::pending(&req, checked.amount);

        let completed = match self.apply(unit.as_mut(), &pending).await {
            Ok(record) => record,
            Err(e) => {
                self.abort(unit).await;
                error!(
                    transaction_id = %pending.id,
                    error = %e,
                    "Transfer mutation failed, rolled back"
                );
                self.record_failure(&pending).await;
                return Err(e);
            }
        };

        if let Err(e) = unit.commit().await {
            error!(
                transaction_id = %pending.id,
                error = %e,
                "Transfer commit failed"
            );
            self.record_failure(&pending).await;
            return Err(e);
        }

        info!(
            transaction_id = %completed.id,
            payer_id = %completed.payer_id,
            payee_id = %completed.payee_id,
            amount = %completed.amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transfer completed"
        );

        self.after_commit(&checked, &completed).await;
        Ok(completed)
    }

    /// Load the committed record for `id`
    pub async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<TransactionRecord, TransferError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| TransferError::TransactionNotFound(id.to_string()))
    }

    pub async fn account_stats(&self, account_id: AccountId) -> Result<AccountStats, TransferError> {
        self.store.account_stats(account_id).await
    }

    /// Filtered, paginated transaction log, newest first
    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<TransactionPage, TransferError> {
        self.store.list_transactions(filter, page).await
    }

    /// Lock both rows, then enforce the local preconditions in order
    async fn check_preconditions(
        &self,
        unit: &mut dyn TransferUnit,
        req: &TransferRequest,
    ) -> Result<Checked, TransferError> {
        let locked = unit.lock_accounts(&[req.payer_id, req.payee_id]).await?;
        debug!(
            payer_id = %req.payer_id,
            payee_id = %req.payee_id,
            locked = locked.len(),
            "Accounts locked"
        );

        let find = |id: AccountId| {
            locked
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .ok_or(TransferError::AccountNotFound(id))
        };
        let payer = find(req.payer_id)?;
        let payee = find(req.payee_id)?;

        if !payer.role.can_send() {
            return Err(TransferError::SenderNotAuthorized);
        }

        if payer.id == payee.id {
            return Err(TransferError::SelfTransfer);
        }

        let amount = validate_amount(req.amount, self.max_amount)?;

        // Balance read under the row lock
        if !payer.has_sufficient_balance(amount) {
            return Err(TransferError::InsufficientBalance);
        }

        Ok(Checked {
            payer,
            payee,
            amount,
        })
    }

    /// Fail-closed: a transport error is a denial
    async fn authorize(&self, req: &TransferRequest) -> Result<(), TransferError> {
        match self.authorizer.authorize().await {
            Ok(true) => {
                debug!(payer_id = %req.payer_id, "Transfer authorized");
                Ok(())
            }
            Ok(false) => {
                warn!(
                    payer_id = %req.payer_id,
                    payee_id = %req.payee_id,
                    "Transfer denied by authorizer"
                );
                Err(TransferError::NotAuthorized(
                    "denied by authorization service".to_string(),
                ))
            }
            Err(e) => {
                warn!(
                    payer_id = %req.payer_id,
                    payee_id = %req.payee_id,
                    error = %e,
                    "Authorizer unavailable, treating as denied"
                );
                Err(TransferError::NotAuthorized(e.to_string()))
            }
        }
    }

    /// Debit, credit, insert and complete inside the open unit
    async fn apply(
        &self,
        unit: &mut dyn TransferUnit,
        record: &TransactionRecord,
    ) -> Result<TransactionRecord, TransferError> {
        unit.adjust_balance(record.payer_id, -record.amount).await?;
        unit.adjust_balance(record.payee_id, record.amount).await?;
        unit.insert_transaction(record).await?;

        if !unit
            .update_status_if(
                record.id,
                TransactionStatus::Pending,
                TransactionStatus::Completed,
            )
            .await?
        {
            return Err(TransferError::PersistenceFailure(format!(
                "Transaction {} left PENDING unexpectedly",
                record.id
            )));
        }

        Ok(record.with_status(TransactionStatus::Completed))
    }

    async fn abort(&self, unit: Box<dyn TransferUnit>) {
        if let Err(e) = unit.rollback().await {
            warn!(error = %e, "Rollback failed; dropping unit");
        }
    }

    /// Best-effort `failed` audit row after a rolled-back mutation
    async fn record_failure(&self, pending: &TransactionRecord) {
        let failed = pending.with_status(TransactionStatus::Failed);
        if let Err(e) = self.store.insert_failed(&failed).await {
            error!(
                transaction_id = %failed.id,
                error = %e,
                "Failed to persist failed transaction record"
            );
        }
    }

    async fn after_commit(&self, checked: &Checked, record: &TransactionRecord) {
        let message = transfer_message(&checked.payee.name, record.amount, &checked.payer.name);
        if let Err(e) = self
            .notifications
            .enqueue(record.id, record.payee_id, message)
            .await
        {
            warn!(
                transaction_id = %record.id,
                error = %e,
                "Failed to enqueue payee notification"
            );
        }

        self.cache
            .invalidate(&[record.payer_id, record.payee_id], record.id);
    }
}
