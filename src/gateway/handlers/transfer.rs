//! Transfer handler

use std::sync::Arc;

use axum::{Json, extract::State, extract::rejection::JsonRejection};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, TransferBody, ok};
use crate::transfer::TransactionRecord;

/// POST /api/v1/transfer
///
/// Body: `{"payer": 4, "payee": 15, "value": "100.00"}`. Returns the
/// completed transaction record.
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<TransactionRecord> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let req = body.into_request();

    tracing::debug!(
        payer_id = %req.payer_id,
        payee_id = %req.payee_id,
        amount = %req.amount,
        "Transfer request"
    );

    let record = state.coordinator.transfer(req).await?;
    ok(record)
}
