//! Gateway types module
//!
//! ## Input Types
//! - [`StrictDecimal`]: Format-validated decimal for API input
//! - [`TransferBody`]: Transfer request payload
//! - [`TransactionListQuery`]: Transaction listing filters
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: Error response carrying its HTTP status

pub mod money;
pub mod query;
pub mod response;

pub use money::{StrictDecimal, TransferBody};
pub use query::TransactionListQuery;
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
