//! PostgreSQL notification store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::error::NotificationError;
use super::store::NotificationStore;
use super::types::{AttemptUpdate, NotificationId, NotificationRecord, NotificationStatus};
use crate::account::AccountId;
use crate::transfer::TransactionId;

const NOTIFICATION_COLUMNS: &str = "id, transaction_id, recipient_id, message, status, attempts, \
     response, next_attempt_at, sent_at, failed_at, created_at, updated_at";

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create_notification(
        &self,
        record: &NotificationRecord,
    ) -> Result<NotificationRecord, NotificationError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, transaction_id, recipient_id, message, status, attempts,
                 next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (transaction_id, recipient_id) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.transaction_id.to_string())
        .bind(record.recipient_id.get())
        .bind(&record.message)
        .bind(record.status.id())
        .bind(record.attempts as i32)
        .bind(record.next_attempt_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE transaction_id = $1 AND recipient_id = $2",
            NOTIFICATION_COLUMNS
        ))
        .bind(record.transaction_id.to_string())
        .bind(record.recipient_id.get())
        .fetch_one(&self.pool)
        .await?;

        row_to_notification(&row)
    }

    async fn get_notification(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationRecord>, NotificationError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_notification).transpose()
    }

    async fn record_attempt(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        update: &AttemptUpdate,
    ) -> Result<bool, NotificationError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1, attempts = $2, response = $3, next_attempt_at = $4,
                sent_at = COALESCE($5, sent_at), failed_at = COALESCE($6, failed_at),
                updated_at = $7
            WHERE id = $8 AND status = $9 AND attempts = $10
            "#,
        )
        .bind(update.status.id())
        .bind(update.attempts as i32)
        .bind(&update.response)
        .bind(update.next_attempt_at)
        .bind(update.sent_at)
        .bind(update.failed_at)
        .bind(update.at)
        .bind(id.to_string())
        .bind(NotificationStatus::Pending.id())
        .bind(previous_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_due(
        &self,
        id: NotificationId,
        previous_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, NotificationError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET next_attempt_at = $1, updated_at = NOW()
            WHERE id = $2 AND status = $3 AND attempts = $4
            "#,
        )
        .bind(at)
        .bind(id.to_string())
        .bind(NotificationStatus::Pending.id())
        .bind(previous_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn notifications_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE transaction_id = $1 ORDER BY created_at",
            NOTIFICATION_COLUMNS
        ))
        .bind(transaction_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    async fn find_pending(&self, limit: usize) -> Result<Vec<NotificationRecord>, NotificationError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE status = $1 \
             ORDER BY next_attempt_at NULLS FIRST LIMIT $2",
            NOTIFICATION_COLUMNS
        ))
        .bind(NotificationStatus::Pending.id())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }
}

fn row_to_notification(row: &PgRow) -> Result<NotificationRecord, NotificationError> {
    let id_str: String = row.try_get("id")?;
    let id: NotificationId = id_str
        .parse()
        .map_err(|_| NotificationError::Persistence(format!("Invalid notification id: {}", id_str)))?;

    let tx_str: String = row.try_get("transaction_id")?;
    let transaction_id: TransactionId = tx_str
        .parse()
        .map_err(|_| NotificationError::Persistence(format!("Invalid transaction id: {}", tx_str)))?;

    let status_id: i16 = row.try_get("status")?;
    let status = NotificationStatus::from_id(status_id).ok_or_else(|| {
        NotificationError::Persistence(format!("Invalid notification status: {}", status_id))
    })?;

    let attempts: i32 = row.try_get("attempts")?;

    Ok(NotificationRecord {
        id,
        transaction_id,
        recipient_id: AccountId(row.try_get("recipient_id")?),
        message: row.try_get("message")?,
        status,
        attempts: attempts.max(0) as u32,
        response: row.try_get("response")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        sent_at: row.try_get("sent_at")?,
        failed_at: row.try_get("failed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
