//! HTTP handlers

pub mod account;
pub mod health;
pub mod notification;
pub mod transfer;

pub use account::{
    get_account, get_account_stats, get_balance, get_notifications, get_transaction,
    list_accounts, list_transactions,
};
pub use health::health_check;
pub use notification::retry_notification;
pub use transfer::create_transfer;
