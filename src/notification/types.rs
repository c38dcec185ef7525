//! Notification records and status

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::account::AccountId;
use crate::transfer::TransactionId;

/// Notification ID (ULID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(ulid::Ulid);

impl NotificationId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotificationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Delivery status
///
/// ```text
/// PENDING ──success──▶ SENT
///    │ ▲
///    │ └─failure, attempts < max
///    └──failure, attempts == max──▶ FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum NotificationStatus {
    Pending = 0,
    /// Terminal: notifier acknowledged with 2xx
    Sent = 10,
    /// Terminal: attempts exhausted
    Failed = -10,
}

impl NotificationStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(NotificationStatus::Pending),
            10 => Some(NotificationStatus::Sent),
            -10 => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One notification row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub transaction_id: TransactionId,
    pub recipient_id: AccountId,
    pub message: String,
    pub status: NotificationStatus,
    /// Only ever increases
    pub attempts: u32,
    /// Last notifier response body or error text
    pub response: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn pending(transaction_id: TransactionId, recipient_id: AccountId, message: String) -> Self {
        let now = Utc::now();
        Self {
            id: NotificationId::new(),
            transaction_id,
            recipient_id,
            message,
            status: NotificationStatus::Pending,
            attempts: 0,
            response: None,
            next_attempt_at: Some(now),
            sent_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an attempt outcome to a copy of this record
    pub fn after_attempt(&self, update: &AttemptUpdate) -> Self {
        let mut next = self.clone();
        next.attempts = update.attempts;
        next.status = update.status;
        next.response = Some(update.response.clone());
        next.next_attempt_at = update.next_attempt_at;
        next.sent_at = update.sent_at.or(self.sent_at);
        next.failed_at = update.failed_at.or(self.failed_at);
        next.updated_at = update.at;
        next
    }
}

/// Persisted effect of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptUpdate {
    pub attempts: u32,
    pub status: NotificationStatus,
    pub response: String,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

/// Delivery totals for one transaction
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationSummary {
    pub total: usize,
    pub sent: usize,
    pub pending: usize,
    pub failed: usize,
    pub notifications: Vec<NotificationRecord>,
}

impl NotificationSummary {
    pub fn from_records(notifications: Vec<NotificationRecord>) -> Self {
        let count = |s: NotificationStatus| notifications.iter().filter(|n| n.status == s).count();
        Self {
            total: notifications.len(),
            sent: count(NotificationStatus::Sent),
            pending: count(NotificationStatus::Pending),
            failed: count(NotificationStatus::Failed),
            notifications,
        }
    }
}
