//! Account read access

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::models::{Account, AccountId, AccountRole};
use crate::transfer::TransferError;

/// Read-side access to accounts.
///
/// Locked reads for transfers go through [`crate::transfer::TransferUnit`];
/// this trait serves the notification worker and read endpoints.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, TransferError>;

    async fn list(&self) -> Result<Vec<Account>, TransferError>;
}

/// PostgreSQL account repository
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, name, email, role, balance, created_at, updated_at";

/// Convert a row selected with [`ACCOUNT_COLUMNS`] into an [`Account`]
pub(crate) fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, TransferError> {
    let role_id: i16 = row.try_get("role")?;
    let role = AccountRole::from_id(role_id).ok_or_else(|| {
        TransferError::PersistenceFailure(format!("Invalid account role: {}", role_id))
    })?;

    Ok(Account {
        id: AccountId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>, TransferError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }
}
