use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::domain::models::booking::{Booking, BookingDraft, BookingPatch, BookingStatus};
use crate::domain::models::subscription::{GenerationRecord, RecurringSubscription, SubscriptionStatus};
use crate::domain::ports::{BookingRepository, Clock, SubscriptionRepository};
use crate::error::AppError;

/// Single authority for booking and subscription rows. Every status write is a
/// compare-and-swap against the status the caller last saw.
pub struct BookingStore {
    bookings: Arc<dyn BookingRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
}

impl BookingStore {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { bookings, subscriptions, clock }
    }

    pub async fn create(&self, draft: &BookingDraft, amount: i64) -> Result<Booking, AppError> {
        validate_draft(draft)?;
        if amount <= 0 {
            return Err(AppError::InvalidAmount(format!("Booking amount must be positive, got {}", amount)));
        }

        let booking = Booking::new(draft, amount, self.clock.now());
        let created = self.bookings.create(&booking).await?;
        info!(booking_id = %created.id, amount, "Booking stored as pending_payment");
        Ok(created)
    }

    pub async fn find(&self, id: &str) -> Result<Option<Booking>, AppError> {
        self.bookings.find_by_id(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Booking, AppError> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))
    }

    pub async fn list_by_subscription(&self, subscription_id: &str) -> Result<Vec<Booking>, AppError> {
        self.bookings.list_by_subscription(subscription_id).await
    }

    /// Moves `id` from `expected` to `to`. Illegal pairs fail with
    /// `InvalidTransition` before touching storage; a lost race fails with
    /// `ConflictingTransition` carrying the status that won.
    pub async fn transition(
        &self,
        id: &str,
        expected: BookingStatus,
        to: BookingStatus,
        patch: BookingPatch,
    ) -> Result<Booking, AppError> {
        if !expected.can_transition_to(to) {
            return Err(AppError::InvalidTransition { from: expected.to_string(), to: to.to_string() });
        }

        match self.bookings.transition(id, expected, to, &patch, self.clock.now()).await? {
            Some(updated) => {
                info!(booking_id = id, from = %expected, to = %to, "Booking transitioned");
                Ok(updated)
            }
            None => {
                let actual = self.bookings.find_by_id(id).await?.map(|b| b.status);
                if actual.is_none() {
                    return Err(AppError::NotFound(format!("Booking {} not found", id)));
                }
                warn!(booking_id = id, expected = %expected, ?actual, "Transition lost a race");
                Err(AppError::ConflictingTransition { expected, actual })
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.bookings.delete(id).await
    }

    pub async fn create_subscription(&self, subscription: &RecurringSubscription) -> Result<RecurringSubscription, AppError> {
        self.subscriptions.create(subscription).await
    }

    pub async fn get_subscription(&self, id: &str) -> Result<RecurringSubscription, AppError> {
        self.subscriptions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
    }

    pub async fn transition_subscription(
        &self,
        id: &str,
        expected: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<RecurringSubscription, AppError> {
        if !subscription_transition_allowed(expected, to) {
            return Err(AppError::InvalidTransition {
                from: expected.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        match self.subscriptions.update_status(id, expected, to, self.clock.now()).await? {
            Some(updated) => {
                info!(subscription_id = id, from = expected.as_str(), to = to.as_str(), "Subscription transitioned");
                Ok(updated)
            }
            None => {
                let current = self.get_subscription(id).await?;
                Err(AppError::InvalidTransition {
                    from: current.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                })
            }
        }
    }

    pub async fn find_generation(
        &self,
        subscription_id: &str,
        source_booking_id: &str,
    ) -> Result<Option<GenerationRecord>, AppError> {
        self.subscriptions.find_generation(subscription_id, source_booking_id).await
    }

    /// At-most-once guard for recurrence: records that `source_booking_id`
    /// produced `generated_booking_id` and advances the subscription.
    /// Fails with `AlreadyGenerated` on a replay; `Ok(None)` when a concurrent
    /// generation already advanced past `next_booking_date`.
    pub async fn record_generated_booking(
        &self,
        subscription_id: &str,
        source_booking_id: &str,
        generated_booking_id: &str,
        next_booking_date: NaiveDate,
    ) -> Result<Option<RecurringSubscription>, AppError> {
        let record = GenerationRecord {
            subscription_id: subscription_id.to_string(),
            source_booking_id: source_booking_id.to_string(),
            generated_booking_id: generated_booking_id.to_string(),
            created_at: self.clock.now(),
        };
        self.subscriptions.record_generation(&record, next_booking_date).await
    }
}

fn subscription_transition_allowed(from: SubscriptionStatus, to: SubscriptionStatus) -> bool {
    use SubscriptionStatus as S;
    matches!(
        (from, to),
        (S::Active, S::Paused)
            | (S::Paused, S::Active)
            | (S::Active | S::Paused, S::Cancelled)
            | (S::Active, S::Completed)
    )
}

fn validate_draft(draft: &BookingDraft) -> Result<(), AppError> {
    if draft.customer_ref.trim().is_empty() {
        return Err(AppError::Validation("customer_ref is required".into()));
    }
    if draft.professional_ref.trim().is_empty() {
        return Err(AppError::Validation("professional_ref is required".into()));
    }
    if draft.customer_ref == draft.professional_ref {
        return Err(AppError::Validation("Customer and professional must differ".into()));
    }
    if draft.service_name.trim().is_empty() {
        return Err(AppError::Validation("service_name is required".into()));
    }
    if draft.duration_minutes <= 0 {
        return Err(AppError::Validation("duration_minutes must be positive".into()));
    }
    if draft.timezone.parse::<Tz>().is_err() {
        return Err(AppError::Validation(format!("Unknown timezone '{}'", draft.timezone)));
    }
    if draft.currency.len() != 3 || !draft.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(format!("Invalid currency '{}'", draft.currency)));
    }
    Ok(())
}
