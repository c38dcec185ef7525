//! Notification persistence seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::NotificationError;
use super::types::{AttemptUpdate, NotificationId, NotificationRecord};
use crate::transfer::TransactionId;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a pending notification.
    ///
    /// At most one row exists per (transaction, recipient); inserting a
    /// duplicate returns the existing row unchanged.
    async fn create_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<NotificationRecord, NotificationError>;

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>, NotificationError>;

    /// Persist an attempt outcome.
    ///
    /// Applied only while the row is still pending with `previous_attempts`
    /// attempts; returns false when another worker got there first.
    async fn record_attempt(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        update: &AttemptUpdate,
    ) -> Result<bool, NotificationError>;

    /// Move the next attempt of a pending row to `at`.
    ///
    /// Same CAS guard as [`Self::record_attempt`]; returns false when the row
    /// is no longer pending with `previous_attempts` attempts.
    async fn mark_due(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, NotificationError>;

    async fn notifications_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<NotificationRecord>, NotificationError>;

    /// Pending rows, oldest scheduled attempt first
    async fn find_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, NotificationError>;
}
