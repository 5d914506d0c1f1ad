use crate::domain::{models::payment::{PaymentCustomer, PaymentHold, UnsettledHold}, ports::PaymentRepository};
use crate::error::{is_unique_violation, AppError};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresPaymentRepo {
    pool: PgPool,
}

impl PostgresPaymentRepo {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepo {
    async fn find_customer(&self, customer_ref: &str) -> Result<Option<PaymentCustomer>, AppError> {
        sqlx::query_as::<_, PaymentCustomer>("SELECT * FROM payment_customers WHERE customer_ref = $1")
            .bind(customer_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn insert_customer(&self, customer: &PaymentCustomer) -> Result<PaymentCustomer, AppError> {
        sqlx::query("INSERT INTO payment_customers (customer_ref, processor_customer_id, created_at) VALUES ($1, $2, $3) ON CONFLICT(customer_ref) DO NOTHING")
            .bind(&customer.customer_ref)
            .bind(&customer.processor_customer_id)
            .bind(customer.created_at)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        self.find_customer(&customer.customer_ref)
            .await?
            .ok_or_else(|| AppError::InternalWithMsg(format!("Customer mapping for {} vanished", customer.customer_ref)))
    }

    async fn insert_hold(&self, hold: &PaymentHold) -> Result<PaymentHold, AppError> {
        let inserted = sqlx::query_as::<_, PaymentHold>(
            "INSERT INTO payment_holds (hold_ref, booking_id, idempotency_key, processor_customer_id, currency, amount_authorized, amount_captured, amount_refunded, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING *"
        )
            .bind(&hold.hold_ref).bind(&hold.booking_id).bind(&hold.idempotency_key).bind(&hold.processor_customer_id)
            .bind(&hold.currency).bind(hold.amount_authorized).bind(hold.amount_captured).bind(hold.amount_refunded)
            .bind(hold.status.as_str()).bind(hold.created_at).bind(hold.updated_at)
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(hold) => Ok(hold),
            Err(e) if is_unique_violation(&e) => self
                .find_hold_by_key(&hold.idempotency_key)
                .await?
                .ok_or(AppError::Database(e)),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn find_hold(&self, hold_ref: &str) -> Result<Option<PaymentHold>, AppError> {
        sqlx::query_as::<_, PaymentHold>("SELECT * FROM payment_holds WHERE hold_ref = $1")
            .bind(hold_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_hold_by_key(&self, idempotency_key: &str) -> Result<Option<PaymentHold>, AppError> {
        sqlx::query_as::<_, PaymentHold>("SELECT * FROM payment_holds WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_active_hold_for_booking(&self, booking_id: &str) -> Result<Option<PaymentHold>, AppError> {
        sqlx::query_as::<_, PaymentHold>(
            "SELECT * FROM payment_holds WHERE booking_id = $1 AND status != 'voided' ORDER BY created_at DESC LIMIT 1"
        )
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn update_hold(&self, hold: &PaymentHold) -> Result<PaymentHold, AppError> {
        sqlx::query_as::<_, PaymentHold>(
            "UPDATE payment_holds SET amount_captured = $1, amount_refunded = $2, status = $3, updated_at = $4 WHERE hold_ref = $5 RETURNING *"
        )
            .bind(hold.amount_captured)
            .bind(hold.amount_refunded)
            .bind(hold.status.as_str())
            .bind(hold.updated_at)
            .bind(&hold.hold_ref)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn find_unsettled_holds(&self, limit: i64) -> Result<Vec<UnsettledHold>, AppError> {
        sqlx::query_as::<_, UnsettledHold>(
            "SELECT h.*, b.refund_amount AS booking_refund_amount
             FROM payment_holds h
             JOIN bookings b ON b.id = h.booking_id
             WHERE b.status IN ('canceled', 'declined')
               AND (h.status = 'requires_capture'
                    OR (h.status IN ('captured', 'partially_refunded') AND h.amount_refunded < COALESCE(b.refund_amount, 0)))
             ORDER BY h.updated_at ASC
             LIMIT $1"
        )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
