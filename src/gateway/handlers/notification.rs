//! Notification handlers

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use crate::notification::{NotificationId, NotificationRecord};

/// POST /api/v1/notifications/{id}/retry
///
/// Queues an immediate attempt for a pending notification. 409 once the
/// notification is sent, failed or out of attempts.
pub async fn retry_notification(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<NotificationRecord> {
    let id: NotificationId = raw
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid notification id: {}", raw)))?;

    let record = state.notifications.retry(id).await?;
    tracing::info!(notification_id = %id, "Manual notification retry");
    ok(record)
}
