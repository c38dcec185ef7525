//! Transfer Core
//!
//! Locked, atomic movement of funds between two accounts.
//!
//! # State Machine
//!
//! ```text
//! PENDING ──commit──▶ COMPLETED
//!    │
//!    └──post-authorization failure──▶ FAILED (audit row, written after rollback)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Fixed lock order**: account rows are locked in ascending id order
//! 2. **Check under lock**: balance sufficiency is read after the lock is held
//! 3. **All or nothing**: debit, credit and the transaction row share one local transaction
//! 4. **Fail closed**: an unreachable authorizer is a denial
//! 5. **Side effects after commit**: notification and cache invalidation never roll back a transfer

pub mod coordinator;
pub mod db;
pub mod error;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use coordinator::TransferCoordinator;
pub use db::PgTransferStore;
pub use error::TransferError;
pub use state::TransactionStatus;
pub use store::{TransferStore, TransferUnit};
pub use types::{
    AccountStats, PageRequest, TransactionFilter, TransactionId, TransactionPage,
    TransactionRecord, TransferRequest,
};
