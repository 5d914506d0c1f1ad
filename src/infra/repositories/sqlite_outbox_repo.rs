use crate::domain::{
    models::outbox::{DeliveryStatus, OutboxMessage},
    ports::NotificationOutbox,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub struct SqliteOutboxRepo {
    pool: SqlitePool,
}

impl SqliteOutboxRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }
}

#[async_trait]
impl NotificationOutbox for SqliteOutboxRepo {
    async fn enqueue(&self, message: &OutboxMessage) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO notification_outbox (id, booking_id, event, status, attempts, deliver_after, last_error, created_at, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
            .bind(&message.id).bind(&message.booking_id).bind(&message.event)
            .bind(message.status.as_str()).bind(message.attempts).bind(message.deliver_after)
            .bind(&message.last_error).bind(message.created_at).bind(message.delivered_at)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    // SQLite serializes writers, so the subquery and the update see the same rows.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, AppError> {
        sqlx::query_as::<_, OutboxMessage>(
            "UPDATE notification_outbox
             SET status = 'claimed', attempts = attempts + 1, deliver_after = ?
             WHERE id IN (
                 SELECT id FROM notification_outbox
                 WHERE status IN ('pending', 'claimed') AND deliver_after <= ?
                 ORDER BY deliver_after, created_at
                 LIMIT ?
             )
             RETURNING *"
        )
            .bind(lease_until)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_for_booking(&self, booking_id: &str) -> Result<Vec<OutboxMessage>, AppError> {
        sqlx::query_as::<_, OutboxMessage>(
            "SELECT * FROM notification_outbox WHERE booking_id = ? ORDER BY created_at"
        )
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn mark_delivered(&self, id: &str, delivered_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE notification_outbox SET status = ?, delivered_at = ?, last_error = NULL WHERE id = ?")
            .bind(DeliveryStatus::Delivered.as_str())
            .bind(delivered_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<(), AppError> {
        let status = if retry_at.is_some() { DeliveryStatus::Pending } else { DeliveryStatus::Failed };
        sqlx::query(
            "UPDATE notification_outbox SET status = ?, last_error = ?, deliver_after = COALESCE(?, deliver_after) WHERE id = ?"
        )
            .bind(status.as_str())
            .bind(error)
            .bind(retry_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
