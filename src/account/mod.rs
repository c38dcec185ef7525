//! Account management module
//!
//! Account records (balance, role) and read access. Balance mutation is owned
//! by the transfer core and happens only inside a locked [`crate::transfer::TransferUnit`].

pub mod models;
pub mod repository;

pub use models::{Account, AccountId, AccountRole, BalanceView};
pub use repository::{AccountStore, PgAccountStore};
