use crate::domain::{models::booking::{Booking, BookingPatch, BookingStatus}, ports::BookingRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;
use chrono::{DateTime, Utc};

pub struct PostgresBookingRepo {
    pool: PgPool,
}

impl PostgresBookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingRepo {
    async fn create(&self, booking: &Booking) -> Result<Booking, AppError> {
        sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (id, customer_ref, professional_ref, service_name, address, instructions, scheduled_start, scheduled_end, duration_minutes, timezone, currency, amount_estimated, amount_authorized, amount_captured, payment_hold_ref, status, canceled_reason, canceled_at, canceled_by, refund_percentage, refund_amount, recurring_plan_id, is_subscription_generated, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
             RETURNING *"
        )
            .bind(&booking.id).bind(&booking.customer_ref).bind(&booking.professional_ref).bind(&booking.service_name)
            .bind(&booking.address).bind(&booking.instructions).bind(booking.scheduled_start).bind(booking.scheduled_end)
            .bind(booking.duration_minutes).bind(&booking.timezone).bind(&booking.currency).bind(booking.amount_estimated)
            .bind(booking.amount_authorized).bind(booking.amount_captured).bind(&booking.payment_hold_ref)
            .bind(booking.status.as_str()).bind(&booking.canceled_reason).bind(booking.canceled_at).bind(&booking.canceled_by)
            .bind(booking.refund_percentage).bind(booking.refund_amount).bind(&booking.recurring_plan_id)
            .bind(booking.is_subscription_generated).bind(booking.created_at).bind(booking.updated_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE recurring_plan_id = $1 ORDER BY scheduled_start ASC").bind(subscription_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn transition(
        &self,
        id: &str,
        expected: BookingStatus,
        to: BookingStatus,
        patch: &BookingPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        let cancellation = patch.cancellation.as_ref();
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = $1,
                scheduled_start = COALESCE($2, scheduled_start), scheduled_end = COALESCE($3, scheduled_end), duration_minutes = COALESCE($4, duration_minutes),
                amount_authorized = COALESCE($5, amount_authorized), amount_captured = COALESCE($6, amount_captured), payment_hold_ref = COALESCE($7, payment_hold_ref),
                canceled_reason = COALESCE($8, canceled_reason), canceled_at = COALESCE($9, canceled_at), canceled_by = COALESCE($10, canceled_by),
                refund_percentage = COALESCE($11, refund_percentage), refund_amount = COALESCE($12, refund_amount),
                updated_at = $13
             WHERE id = $14 AND status = $15
             RETURNING *"
        )
            .bind(to.as_str())
            .bind(patch.schedule.map(|s| s.start())).bind(patch.schedule.map(|s| s.end())).bind(patch.schedule.map(|s| s.duration_minutes()))
            .bind(patch.amount_authorized).bind(patch.amount_captured).bind(&patch.payment_hold_ref)
            .bind(cancellation.map(|c| c.reason.clone())).bind(cancellation.map(|c| c.canceled_at)).bind(cancellation.map(|c| c.canceled_by.clone()))
            .bind(cancellation.map(|c| c.refund_percentage)).bind(cancellation.map(|c| c.refund_amount))
            .bind(updated_at)
            .bind(id).bind(expected.as_str())
            .fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1").bind(id).execute(&self.pool).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Err(AppError::NotFound("Booking not found".into())); }
        Ok(())
    }
}
