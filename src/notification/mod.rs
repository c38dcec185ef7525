//! Notification dispatch and retry
//!
//! After a transfer commits, the payee gets one notification. Delivery is
//! asynchronous and at-least-once with bounded retries; its outcome never
//! changes the transfer.
//!
//! - [`NotificationDispatcher`]: persists a pending row and queues it
//! - [`DeliveryEngine`]: attempts delivery, applies [`RetryPolicy`]
//! - [`Notifier`]: the outbound channel ([`HttpNotifier`] in production)

pub mod db;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod policy;
pub mod store;
pub mod types;
pub mod worker;

pub use db::PgNotificationStore;
pub use dispatcher::{NotificationDispatcher, NotificationJob, transfer_message};
pub use error::{NotificationError, NotifyError};
pub use notifier::{HttpNotifier, Notifier};
pub use policy::{AttemptDecision, NotifierConfig, RetryPolicy};
pub use store::NotificationStore;
pub use types::{
    AttemptUpdate, NotificationId, NotificationRecord, NotificationStatus, NotificationSummary,
};
pub use worker::{AttemptOutcome, DeliveryConfig, DeliveryEngine};
