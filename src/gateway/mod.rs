//! HTTP Gateway
//!
//! Thin request layer in front of the transfer core: parses and shapes
//! requests, maps [`crate::transfer::TransferError`] to HTTP statuses and
//! serves cached read views.

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use state::AppState;

/// Build the gateway router
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/transfer", post(handlers::create_transfer))
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/balance", get(handlers::get_balance))
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/{id}", get(handlers::get_transaction))
        .route(
            "/transactions/{id}/notifications",
            get(handlers::get_notifications),
        )
        .route(
            "/transactions/account/{id}/stats",
            get(handlers::get_account_stats),
        )
        .route(
            "/notifications/{id}/retry",
            post(handlers::retry_notification),
        )
        .route("/health", get(handlers::health_check));

    Router::new().nest("/api/v1", api).with_state(state)
}

/// Start HTTP Gateway server
pub async fn run_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
