//! Transfer Error Types
//!
//! Each precondition of a transfer fails with its own variant so callers can
//! tell "retry with different input" from "retry later" from "never retry".

use thiserror::Error;

use crate::account::AccountId;
use crate::money::MoneyError;

/// Transfer error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Lookup Errors ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // === Business Rule Errors ===
    #[error("Account role does not allow sending transfers")]
    SenderNotAuthorized,

    #[error("Payer and payee cannot be the same account")]
    SelfTransfer,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    // === External Authorization ===
    #[error("Transfer not authorized: {0}")]
    NotAuthorized(String),

    // === System Errors ===
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransferError::SenderNotAuthorized => "SENDER_NOT_AUTHORIZED",
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::NotAuthorized(_) => "NOT_AUTHORIZED",
            TransferError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::AccountNotFound(_) | TransferError::TransactionNotFound(_) => 404,
            TransferError::SenderNotAuthorized | TransferError::NotAuthorized(_) => 403,
            TransferError::SelfTransfer | TransferError::InvalidAmount(_) => 400,
            TransferError::InsufficientBalance => 422,
            TransferError::PersistenceFailure(_) => 503,
        }
    }

    /// Whether the caller may retry the identical request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::PersistenceFailure(_))
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::PersistenceFailure(e.to_string())
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        TransferError::InvalidAmount(e.to_string())
    }
}
