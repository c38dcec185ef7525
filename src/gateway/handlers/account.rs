//! Account and transaction read handlers
//!
//! Views are served from the read cache when present; the transfer
//! coordinator evicts them after every committed transfer.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State, rejection::QueryRejection};
use serde::Serialize;
use serde_json::Value;

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, TransactionListQuery, ok};
use crate::account::{AccountId, BalanceView};
use crate::cache::{ReadCache, keys};
use crate::notification::NotificationSummary;
use crate::transfer::{TransactionId, TransferError};

/// Serve `key` from the cache, or load and serve it, storing it unless invalidated meanwhile
async fn cached<T, F, Fut>(cache: &ReadCache, key: String, load: F) -> Result<Value, ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(hit) = cache.get::<Value>(&key) {
        return Ok(hit);
    }

    // Not stored if a commit evicted while loading
    let generation = cache.generation();
    let view = load().await?;
    let value = serde_json::to_value(&view).map_err(|e| ApiError::internal(e.to_string()))?;
    cache.put_if_current(key, &value, generation);
    Ok(value)
}

fn parse_transaction_id(raw: &str) -> Result<TransactionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid transaction id: {}", raw)))
}

/// GET /api/v1/accounts
pub async fn list_accounts(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let accounts = state.accounts.clone();
    let view = cached(&state.cache, keys::ACCOUNTS_ALL.to_string(), || async move {
        Ok::<_, ApiError>(accounts.list().await?)
    })
    .await?;
    ok(view)
}

/// GET /api/v1/accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    let id = AccountId(id);
    let accounts = state.accounts.clone();
    let view = cached(&state.cache, keys::account(id), || async move {
        let account = accounts
            .get(id)
            .await?
            .ok_or(TransferError::AccountNotFound(id))?;
        Ok::<_, ApiError>(account)
    })
    .await?;
    ok(view)
}

/// GET /api/v1/accounts/{id}/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    let id = AccountId(id);
    let accounts = state.accounts.clone();
    let view = cached(&state.cache, keys::account_balance(id), || async move {
        let account = accounts
            .get(id)
            .await?
            .ok_or(TransferError::AccountNotFound(id))?;
        Ok::<_, ApiError>(BalanceView::from(&account))
    })
    .await?;
    ok(view)
}

/// GET /api/v1/transactions
///
/// Query: `status`, `payer_id`, `payee_id`, `date_from`, `date_to`, `page`,
/// `per_page`. Newest first; each distinct query is cached until the next commit.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TransactionListQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (filter, page) = query.into_filter()?;
    let key = keys::transaction_list(&filter.canonical_query(page));

    let coordinator = state.coordinator.clone();
    let view = cached(&state.cache, key, || async move {
        Ok::<_, ApiError>(coordinator.list_transactions(&filter, page).await?)
    })
    .await?;
    ok(view)
}

/// GET /api/v1/transactions/{id}
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<Value> {
    let id = parse_transaction_id(&raw)?;
    let coordinator = state.coordinator.clone();
    let view = cached(&state.cache, keys::transaction(id), || async move {
        Ok::<_, ApiError>(coordinator.get_transaction(id).await?)
    })
    .await?;
    ok(view)
}

/// GET /api/v1/transactions/{id}/notifications
pub async fn get_notifications(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> ApiResult<NotificationSummary> {
    let id = parse_transaction_id(&raw)?;
    // 404 for unknown transactions rather than an empty summary
    state.coordinator.get_transaction(id).await?;
    let summary = state.notifications.summary(id).await?;
    ok(summary)
}

/// GET /api/v1/transactions/account/{id}/stats
pub async fn get_account_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    let id = AccountId(id);
    let accounts = state.accounts.clone();
    let coordinator = state.coordinator.clone();
    let view = cached(&state.cache, keys::account_stats(id), || async move {
        accounts
            .get(id)
            .await?
            .ok_or(TransferError::AccountNotFound(id))?;
        Ok::<_, ApiError>(coordinator.account_stats(id).await?)
    })
    .await?;
    ok(view)
}
