use crate::domain::{models::subscription::{GenerationRecord, RecurringSubscription, SubscriptionStatus}, ports::SubscriptionRepository};
use crate::error::{is_unique_violation, AppError};
use async_trait::async_trait;
use sqlx::SqlitePool;
use chrono::{DateTime, NaiveDate, Utc};

pub struct SqliteSubscriptionRepo {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepo {
    async fn create(&self, s: &RecurringSubscription) -> Result<RecurringSubscription, AppError> {
        sqlx::query_as::<_, RecurringSubscription>(
            "INSERT INTO recurring_subscriptions (id, customer_ref, professional_ref, frequency, day_of_week, preferred_time, timezone, service_name, hourly_rate, duration_minutes, address, instructions, currency, discount_percentage, discounted_amount, end_type, total_count, end_date, next_booking_date, total_occurrences_completed, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *"
        )
            .bind(&s.id).bind(&s.customer_ref).bind(&s.professional_ref).bind(s.frequency.as_str())
            .bind(s.day_of_week).bind(s.preferred_time).bind(&s.timezone).bind(&s.service_name)
            .bind(s.hourly_rate).bind(s.duration_minutes).bind(&s.address).bind(&s.instructions)
            .bind(&s.currency).bind(s.discount_percentage).bind(s.discounted_amount).bind(s.end_type.as_str())
            .bind(s.total_count).bind(s.end_date).bind(s.next_booking_date).bind(s.total_occurrences_completed)
            .bind(s.status.as_str()).bind(s.created_at).bind(s.updated_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RecurringSubscription>, AppError> {
        sqlx::query_as::<_, RecurringSubscription>("SELECT * FROM recurring_subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn update_status(
        &self,
        id: &str,
        expected: SubscriptionStatus,
        to: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<RecurringSubscription>, AppError> {
        sqlx::query_as::<_, RecurringSubscription>(
            "UPDATE recurring_subscriptions SET status = ?, updated_at = ? WHERE id = ? AND status = ? RETURNING *"
        )
            .bind(to.as_str())
            .bind(updated_at)
            .bind(id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_generation(&self, subscription_id: &str, source_booking_id: &str) -> Result<Option<GenerationRecord>, AppError> {
        sqlx::query_as::<_, GenerationRecord>(
            "SELECT * FROM subscription_generations WHERE subscription_id = ? AND source_booking_id = ?"
        )
            .bind(subscription_id)
            .bind(source_booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn record_generation(
        &self,
        record: &GenerationRecord,
        next_booking_date: NaiveDate,
    ) -> Result<Option<RecurringSubscription>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let inserted = sqlx::query(
            "INSERT INTO subscription_generations (subscription_id, source_booking_id, generated_booking_id, created_at) VALUES (?, ?, ?, ?)"
        )
            .bind(&record.subscription_id)
            .bind(&record.source_booking_id)
            .bind(&record.generated_booking_id)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await;

        if let Err(e) = inserted {
            tx.rollback().await.map_err(AppError::Database)?;
            if is_unique_violation(&e) {
                if let Some(existing) = self.find_generation(&record.subscription_id, &record.source_booking_id).await? {
                    return Err(AppError::AlreadyGenerated { existing_booking_id: existing.generated_booking_id });
                }
            }
            return Err(AppError::Database(e));
        }

        let advanced = sqlx::query_as::<_, RecurringSubscription>(
            "UPDATE recurring_subscriptions
             SET next_booking_date = ?, total_occurrences_completed = total_occurrences_completed + 1, updated_at = ?
             WHERE id = ? AND status = 'active' AND next_booking_date < ?
             RETURNING *"
        )
            .bind(next_booking_date)
            .bind(record.created_at)
            .bind(&record.subscription_id)
            .bind(next_booking_date)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        match advanced {
            Some(subscription) => {
                tx.commit().await.map_err(AppError::Database)?;
                Ok(Some(subscription))
            }
            None => {
                tx.rollback().await.map_err(AppError::Database)?;
                Ok(None)
            }
        }
    }
}
