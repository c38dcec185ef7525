//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError`: Error response with HTTP status
//! - `error_codes`: Standard error code constants

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::notification::NotificationError;
use crate::transfer::TransferError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or absent (error)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 OK with `data`
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        let code = match &e {
            TransferError::AccountNotFound(_) => error_codes::ACCOUNT_NOT_FOUND,
            TransferError::TransactionNotFound(_) => error_codes::TRANSACTION_NOT_FOUND,
            TransferError::SenderNotAuthorized => error_codes::SENDER_NOT_AUTHORIZED,
            TransferError::SelfTransfer => error_codes::SELF_TRANSFER,
            TransferError::InvalidAmount(_) => error_codes::INVALID_AMOUNT,
            TransferError::InsufficientBalance => error_codes::INSUFFICIENT_BALANCE,
            TransferError::NotAuthorized(_) => error_codes::NOT_AUTHORIZED,
            TransferError::PersistenceFailure(_) => error_codes::SERVICE_UNAVAILABLE,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, code, e.to_string())
    }
}

impl From<NotificationError> for ApiError {
    fn from(e: NotificationError) -> Self {
        match &e {
            NotificationError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, error_codes::NOTIFICATION_NOT_FOUND, e.to_string())
            }
            NotificationError::NotRetryable(_) => Self::new(
                StatusCode::CONFLICT,
                error_codes::NOTIFICATION_NOT_RETRYABLE,
                e.to_string(),
            ),
            _ => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::SERVICE_UNAVAILABLE,
                e.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const INVALID_AMOUNT: i32 = 1003;
    pub const SELF_TRANSFER: i32 = 1004;

    // Permission errors (2xxx)
    pub const SENDER_NOT_AUTHORIZED: i32 = 2001;
    pub const NOT_AUTHORIZED: i32 = 2002;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4001;
    pub const TRANSACTION_NOT_FOUND: i32 = 4002;
    pub const NOTIFICATION_NOT_FOUND: i32 = 4003;

    // State conflicts (409x)
    pub const NOTIFICATION_NOT_RETRYABLE: i32 = 4091;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;

    #[test]
    fn test_transfer_error_mapping() {
        let cases = [
            (TransferError::AccountNotFound(AccountId(1)), 404, error_codes::ACCOUNT_NOT_FOUND),
            (TransferError::SenderNotAuthorized, 403, error_codes::SENDER_NOT_AUTHORIZED),
            (TransferError::SelfTransfer, 400, error_codes::SELF_TRANSFER),
            (TransferError::InvalidAmount("x".into()), 400, error_codes::INVALID_AMOUNT),
            (TransferError::InsufficientBalance, 422, error_codes::INSUFFICIENT_BALANCE),
            (TransferError::NotAuthorized("x".into()), 403, error_codes::NOT_AUTHORIZED),
            (TransferError::PersistenceFailure("x".into()), 503, error_codes::SERVICE_UNAVAILABLE),
        ];

        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status.as_u16(), status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_notification_error_mapping() {
        use crate::notification::NotificationId;

        let id = NotificationId::new();
        let cases = [
            (NotificationError::NotFound(id), 404, error_codes::NOTIFICATION_NOT_FOUND),
            (NotificationError::NotRetryable(id), 409, error_codes::NOTIFICATION_NOT_RETRYABLE),
            (NotificationError::QueueClosed, 503, error_codes::SERVICE_UNAVAILABLE),
        ];
        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status.as_u16(), status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error(1001, "bad")).unwrap();
        assert_eq!(body["code"], 1001);
        assert_eq!(body["msg"], "bad");
        assert!(body.get("data").is_none());
    }
}
