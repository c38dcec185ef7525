//! fundsflow - Account-to-Account Funds Transfer Core
//!
//! Moves money between accounts atomically, consults an external authorizer
//! before committing, records every attempt in a transaction log and
//! notifies payees asynchronously with bounded retries.
//!
//! # Modules
//!
//! - [`money`] - Amount parsing and validation (2 decimal places)
//! - [`account`] - Account model and read store
//! - [`transfer`] - Transfer coordinator, transaction log, storage seams
//! - [`authorizer`] - External authorization client (fail-closed)
//! - [`notification`] - Payee notifications: dispatcher, retry engine, stores
//! - [`cache`] - Read cache and post-commit invalidation hook
//! - [`memory`] - In-memory store used by standalone mode and tests
//! - [`db`] - PostgreSQL connection pool
//! - [`gateway`] - HTTP API
//! - [`config`] / [`logging`] - Ambient setup

pub mod account;
pub mod authorizer;
pub mod cache;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod money;
pub mod notification;
pub mod transfer;

// Convenient re-exports at crate root
pub use account::{Account, AccountId, AccountRole, AccountStore, BalanceView, PgAccountStore};
pub use authorizer::{Authorizer, AuthorizerConfig, build_authorizer};
pub use cache::{CacheInvalidator, ReadCache};
pub use config::AppConfig;
pub use db::Database;
pub use memory::MemoryStore;
pub use notification::{DeliveryEngine, NotificationDispatcher, Notifier};
pub use transfer::{
    TransactionId, TransactionRecord, TransactionStatus, TransferCoordinator, TransferError,
    TransferRequest,
};
