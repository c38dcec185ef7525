//! Health check handler

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

/// Health check response data
#[derive(Serialize)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    pub timestamp_ms: u64,
    /// `postgres` or `standalone`
    pub storage: &'static str,
}

/// GET /api/v1/health
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms, storage}}
/// - Database unreachable: 503 + {code: 5001, msg: "unavailable"}
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let storage = match &state.database {
        Some(db) => {
            if let Err(e) = db.health_check().await {
                tracing::warn!(error = %e, "Health check: database unreachable");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse {
                        code: error_codes::SERVICE_UNAVAILABLE,
                        msg: "unavailable".to_string(),
                        data: None,
                    }),
                );
            }
            "postgres"
        }
        None => "standalone",
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthResponse {
            timestamp_ms,
            storage,
        })),
    )
}
