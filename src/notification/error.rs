//! Notification error types

use thiserror::Error;

use super::types::NotificationId;

/// Notification store / dispatch errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    #[error("Notification persistence failure: {0}")]
    Persistence(String),

    #[error("Notification cannot be retried: {0}")]
    NotRetryable(NotificationId),

    #[error("Notification queue closed")]
    QueueClosed,
}

impl From<sqlx::Error> for NotificationError {
    fn from(e: sqlx::Error) -> Self {
        NotificationError::Persistence(e.to_string())
    }
}

/// Outcome of one call to the notifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notifier rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Notifier transport error: {0}")]
    Transport(String),

    #[error("Notifier client configuration error: {0}")]
    Config(String),
}
