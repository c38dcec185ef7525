//! Notification Dispatcher
//!
//! Persists a pending notification and hands it to the delivery engine over
//! an in-process queue. Never fails a committed transfer: if the queue is
//! full or closed the row stays pending and the engine's periodic recovery
//! scan picks it up.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::NotificationError;
use super::policy::RetryPolicy;
use super::store::NotificationStore;
use super::types::{NotificationId, NotificationRecord, NotificationSummary};
use crate::account::AccountId;
use crate::money::format_amount;
use crate::transfer::TransactionId;

/// Unit of work for the delivery engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationJob {
    pub notification_id: NotificationId,
}

/// Text sent to the payee of a completed transfer
pub fn transfer_message(payee_name: &str, amount: Decimal, payer_name: &str) -> String {
    format!(
        "Hello {}! You received a transfer of {} from {}.",
        payee_name,
        format_amount(amount),
        payer_name
    )
}

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    queue: mpsc::Sender<NotificationJob>,
    /// Manual retries are refused once a row has used this many attempts
    max_attempts: u32,
}

impl NotificationDispatcher {
    /// Create a dispatcher and the receiving end of its job queue
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue_size: usize,
    ) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let dispatcher = Self {
            store,
            queue: tx,
            max_attempts: RetryPolicy::default().max_attempts,
        };
        (dispatcher, rx)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sender used by the delivery engine to re-enqueue retries
    pub fn sender(&self) -> mpsc::Sender<NotificationJob> {
        self.queue.clone()
    }

    /// Persist a pending notification and queue its first attempt
    pub async fn enqueue(
        &self,
        transaction_id: TransactionId,
        recipient_id: AccountId,
        message: String,
    ) -> Result<NotificationRecord, NotificationError> {
        let record = self
            .store
            .create_notification(&NotificationRecord::pending(
                transaction_id,
                recipient_id,
                message,
            ))
            .await?;

        if record.status.is_terminal() {
            debug!(
                notification_id = %record.id,
                status = %record.status,
                "Notification already finished, not queued"
            );
            return Ok(record);
        }

        let job = NotificationJob {
            notification_id: record.id,
        };
        match self.queue.try_send(job) {
            Ok(()) => {
                debug!(
                    notification_id = %record.id,
                    transaction_id = %transaction_id,
                    "Notification queued"
                );
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    notification_id = %record.id,
                    "Notification queue full, left pending for recovery"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    notification_id = %record.id,
                    "Notification queue closed, left pending for recovery"
                );
            }
        }

        Ok(record)
    }

    /// Bring a pending notification's next attempt forward to now.
    ///
    /// Refused for rows that already finished or used up their attempts.
    /// A full queue is not an error: the row is due and the recovery scan
    /// delivers it.
    pub async fn retry(&self, id: NotificationId) -> Result<NotificationRecord, NotificationError> {
        let mut record = self
            .store
            .get_notification(id)
            .await?
            .ok_or(NotificationError::NotFound(id))?;

        if record.status.is_terminal() || record.attempts >= self.max_attempts {
            return Err(NotificationError::NotRetryable(id));
        }

        let now = Utc::now();
        if !self.store.mark_due(id, record.attempts, now).await? {
            // An attempt finished between the read and the update
            return Err(NotificationError::NotRetryable(id));
        }
        record.next_attempt_at = Some(now);

        match self.queue.try_send(NotificationJob { notification_id: id }) {
            Ok(()) => info!(
                notification_id = %id,
                attempts = record.attempts,
                "Notification retry queued"
            ),
            Err(mpsc::error::TrySendError::Full(_)) => warn!(
                notification_id = %id,
                "Notification queue full, retry left to recovery"
            ),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(NotificationError::QueueClosed),
        }

        Ok(record)
    }

    /// Delivery summary for one transaction
    pub async fn summary(
        &self,
        transaction_id: TransactionId,
    ) -> Result<NotificationSummary, NotificationError> {
        let notifications = self
            .store
            .notifications_for_transaction(transaction_id)
            .await?;
        Ok(NotificationSummary::from_records(notifications))
    }
}
