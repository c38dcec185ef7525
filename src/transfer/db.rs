//! Transfer Database Layer
//!
//! PostgreSQL-backed transfer units. Row locks use `SELECT ... FOR UPDATE`,
//! status updates use atomic CAS on the expected status.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::error::TransferError;
use super::state::TransactionStatus;
use super::store::{TransferStore, TransferUnit, lock_order};
use super::types::{
    AccountStats, PageRequest, TransactionFilter, TransactionId, TransactionPage,
    TransactionRecord,
};
use crate::account::repository::{ACCOUNT_COLUMNS, row_to_account};
use crate::account::{Account, AccountId};

const TRANSACTION_COLUMNS: &str =
    "id, payer_id, payee_id, amount, status, description, created_at, updated_at";

/// Transfer database operations
pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One open Postgres transaction
pub struct PgTransferUnit {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn begin(&self) -> Result<Box<dyn TransferUnit>, TransferError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransferUnit { tx }))
    }

    async fn insert_failed(&self, record: &TransactionRecord) -> Result<(), TransferError> {
        debug_assert_eq!(record.status, TransactionStatus::Failed);
        insert_record(&self.pool, record).await
    }

    async fn get_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn account_stats(&self, account_id: AccountId) -> Result<AccountStats, TransferError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE payer_id = $1 AND status = $2), 0) AS total_sent,
                COALESCE(SUM(amount) FILTER (WHERE payee_id = $1 AND status = $2), 0) AS total_received,
                COUNT(*) FILTER (WHERE payer_id = $1) AS sent_count,
                COUNT(*) FILTER (WHERE payee_id = $1) AS received_count,
                COUNT(*) FILTER (WHERE status = $3) AS pending_count
            FROM transactions
            WHERE payer_id = $1 OR payee_id = $1
            "#,
        )
        .bind(account_id.get())
        .bind(TransactionStatus::Completed.id())
        .bind(TransactionStatus::Pending.id())
        .fetch_one(&self.pool)
        .await?;

        Ok(AccountStats {
            total_sent: row.try_get("total_sent")?,
            total_received: row.try_get("total_received")?,
            total_transactions_sent: row.try_get::<i64, _>("sent_count")? as u64,
            total_transactions_received: row.try_get::<i64, _>("received_count")? as u64,
            pending_transactions: row.try_get::<i64, _>("pending_count")? as u64,
        })
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<TransactionPage, TransferError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transactions");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM transactions",
            TRANSACTION_COLUMNS
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.per_page))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let data = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransactionPage::new(data, total.max(0) as u64, page))
    }
}

/// Append the WHERE clause for `filter`; dates compare on the UTC day
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.id());
    }
    if let Some(payer) = filter.payer_id {
        qb.push(" AND payer_id = ").push_bind(payer.get());
    }
    if let Some(payee) = filter.payee_id {
        qb.push(" AND payee_id = ").push_bind(payee.get());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND (created_at AT TIME ZONE 'UTC')::date >= ")
            .push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND (created_at AT TIME ZONE 'UTC')::date <= ")
            .push_bind(to);
    }
}

#[async_trait]
impl TransferUnit for PgTransferUnit {
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, TransferError> {
        let mut locked = Vec::with_capacity(ids.len());

        // One statement per row so the acquisition order is explicit
        for id in lock_order(ids) {
            let row = sqlx::query(&format!(
                "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
                ACCOUNT_COLUMNS
            ))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;

            if let Some(row) = row {
                locked.push(row_to_account(&row)?);
            }
        }

        Ok(locked)
    }

    async fn adjust_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, TransferError> {
        // The schema also carries CHECK (balance >= 0)
        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE accounts
            SET balance = balance + $1, updated_at = NOW()
            WHERE id = $2 AND balance + $1 >= 0
            RETURNING balance
            "#,
        )
        .bind(delta)
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        balance.ok_or_else(|| {
            TransferError::PersistenceFailure(format!(
                "Balance update rejected for account {}",
                id
            ))
        })
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), TransferError> {
        insert_record(&mut *self.tx, record).await
    }

    async fn update_status_if(
        &mut self,
        id: TransactionId,
        expected: TransactionStatus,
        new: TransactionStatus,
    ) -> Result<bool, TransferError> {
        if !expected.can_transition_to(new) {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(new.id())
        .bind(id.to_string())
        .bind(expected.id())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

async fn insert_record<'e, E>(executor: E, record: &TransactionRecord) -> Result<(), TransferError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, payer_id, payee_id, amount, status, description, created_at, updated_at)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.payer_id.get())
    .bind(record.payee_id.get())
    .bind(record.amount)
    .bind(record.status.id())
    .bind(&record.description)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Convert database row to TransactionRecord
fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<TransactionRecord, TransferError> {
    let id_str: String = row.try_get("id")?;
    let id: TransactionId = id_str
        .parse()
        .map_err(|_| TransferError::PersistenceFailure(format!("Invalid transaction id: {}", id_str)))?;

    let status_id: i16 = row.try_get("status")?;
    let status = TransactionStatus::from_id(status_id).ok_or_else(|| {
        TransferError::PersistenceFailure(format!("Invalid status ID: {}", status_id))
    })?;

    Ok(TransactionRecord {
        id,
        payer_id: AccountId(row.try_get("payer_id")?),
        payee_id: AccountId(row.try_get("payee_id")?),
        amount: row.try_get("amount")?,
        status,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
