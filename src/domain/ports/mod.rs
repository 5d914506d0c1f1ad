use crate::domain::models::{
    actor::Actor,
    booking::{Booking, BookingPatch, BookingStatus},
    notification::NotificationEvent,
    outbox::OutboxMessage,
    payment::{AuthorizeRequest, PaymentCustomer, PaymentHold, ProcessorHold, ProcessorRefund, UnsettledHold},
    subscription::{GenerationRecord, RecurringSubscription, SubscriptionStatus},
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: &Booking) -> Result<Booking, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Booking>, AppError>;
    async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Booking>, AppError>;
    /// Compare-and-swap: writes only while the row is still in `expected`.
    /// `Ok(None)` means the row is missing or was moved by someone else.
    async fn transition(
        &self,
        id: &str,
        expected: BookingStatus,
        to: BookingStatus,
        patch: &BookingPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError>;
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &RecurringSubscription) -> Result<RecurringSubscription, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<RecurringSubscription>, AppError>;
    /// Compare-and-swap on status, `Ok(None)` when `expected` no longer holds.
    async fn update_status(
        &self,
        id: &str,
        expected: SubscriptionStatus,
        to: SubscriptionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<RecurringSubscription>, AppError>;
    async fn find_generation(&self, subscription_id: &str, source_booking_id: &str) -> Result<Option<GenerationRecord>, AppError>;
    /// Inserts the generation row and advances `next_booking_date` and the
    /// completed counter in one transaction. A duplicate
    /// `(subscription_id, source_booking_id)` yields `AppError::AlreadyGenerated`;
    /// `Ok(None)` means the subscription already moved past `next_booking_date`
    /// and nothing was written.
    async fn record_generation(
        &self,
        record: &GenerationRecord,
        next_booking_date: NaiveDate,
    ) -> Result<Option<RecurringSubscription>, AppError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_customer(&self, customer_ref: &str) -> Result<Option<PaymentCustomer>, AppError>;
    /// First writer wins; a concurrent duplicate returns the stored mapping.
    async fn insert_customer(&self, customer: &PaymentCustomer) -> Result<PaymentCustomer, AppError>;
    async fn insert_hold(&self, hold: &PaymentHold) -> Result<PaymentHold, AppError>;
    async fn find_hold(&self, hold_ref: &str) -> Result<Option<PaymentHold>, AppError>;
    async fn find_hold_by_key(&self, idempotency_key: &str) -> Result<Option<PaymentHold>, AppError>;
    async fn find_active_hold_for_booking(&self, booking_id: &str) -> Result<Option<PaymentHold>, AppError>;
    async fn update_hold(&self, hold: &PaymentHold) -> Result<PaymentHold, AppError>;
    /// Holds on canceled/declined bookings whose money side never caught up.
    async fn find_unsettled_holds(&self, limit: i64) -> Result<Vec<UnsettledHold>, AppError>;
}

#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    async fn enqueue(&self, message: &OutboxMessage) -> Result<(), AppError>;
    /// Claims up to `limit` messages due at `now` and bumps their attempt
    /// count. A claimed message is leased until `lease_until`; after that
    /// another worker may take it again.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, AppError>;
    async fn list_for_booking(&self, booking_id: &str) -> Result<Vec<OutboxMessage>, AppError>;
    async fn mark_delivered(&self, id: &str, delivered_at: DateTime<Utc>) -> Result<(), AppError>;
    /// `retry_at` puts the message back in line; `None` gives up on it.
    async fn mark_failed(&self, id: &str, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<(), AppError>;
}

/// Abstract card processor. Every mutating call carries an idempotency key the
/// processor uses to collapse retries.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(&self, customer_ref: &str, idempotency_key: &str) -> Result<String, AppError>;
    async fn authorize(&self, request: &AuthorizeRequest) -> Result<ProcessorHold, AppError>;
    async fn capture(&self, hold_ref: &str, amount: i64, idempotency_key: &str) -> Result<ProcessorHold, AppError>;
    async fn void(&self, hold_ref: &str, idempotency_key: &str) -> Result<ProcessorHold, AppError>;
    async fn refund(&self, hold_ref: &str, amount: i64, idempotency_key: &str) -> Result<ProcessorRefund, AppError>;
    async fn retrieve(&self, hold_ref: &str) -> Result<ProcessorHold, AppError>;
    /// Finds a hold created under `idempotency_key`, used to settle ambiguous authorizations.
    async fn find_by_idempotency_key(&self, idempotency_key: &str) -> Result<Option<ProcessorHold>, AppError>;
}

#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn emit(&self, event: &NotificationEvent) -> Result<(), AppError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Actor, AppError>;
}
