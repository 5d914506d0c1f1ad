use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::models::booking::{Booking, BookingDraft, BookingPrice, BookingStatus};
use crate::domain::models::notification::{LifecycleOutput, NotificationEvent, NotificationKind};
use crate::domain::models::subscription::{RecurringSubscription, SubscriptionStatus};
use crate::domain::ports::Clock;
use crate::domain::services::booking_store::BookingStore;
use crate::domain::services::policy::{calculate_next_occurrence, should_terminate_subscription};
use crate::error::AppError;

const MAX_GENERATION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotRecurring,
    SubscriptionInactive,
    SubscriptionEnded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { booking: Booking },
    /// The source booking had already produced its successor.
    Replayed { booking: Booking },
    Skipped { reason: SkipReason },
}

impl GenerationOutcome {
    pub fn booking(&self) -> Option<&Booking> {
        match self {
            GenerationOutcome::Generated { booking } | GenerationOutcome::Replayed { booking } => Some(booking),
            GenerationOutcome::Skipped { .. } => None,
        }
    }
}

pub struct RecurrenceGenerator {
    store: Arc<BookingStore>,
    clock: Arc<dyn Clock>,
}

impl RecurrenceGenerator {
    pub fn new(store: Arc<BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Spawns the occurrence after `completed_booking_id`. Safe to call any
    /// number of times for the same source booking: at most one successor is
    /// ever persisted.
    pub async fn generate_next(&self, completed_booking_id: &str) -> Result<LifecycleOutput<GenerationOutcome>, AppError> {
        let source = self.store.get(completed_booking_id).await?;
        if source.status != BookingStatus::Completed {
            return Err(AppError::Validation(format!(
                "Booking {} is {}; only completed bookings seed the next occurrence",
                source.id, source.status
            )));
        }

        let Some(subscription_id) = source.recurring_plan_id.clone() else {
            return Ok(skipped(SkipReason::NotRecurring));
        };

        if let Some(existing) = self.replayed(&subscription_id, &source.id).await? {
            return Ok(existing);
        }

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let subscription = self.store.get_subscription(&subscription_id).await?;
            match subscription.status {
                SubscriptionStatus::Active => {}
                SubscriptionStatus::Completed => return Ok(skipped(SkipReason::SubscriptionEnded)),
                _ => {
                    info!(subscription_id = %subscription.id, status = subscription.status.as_str(), "Subscription not active, skipping generation");
                    return Ok(skipped(SkipReason::SubscriptionInactive));
                }
            }

            let Some((next_date, start)) = self.next_slot(&subscription) else {
                return self.end_subscription(&subscription, &source).await;
            };

            let draft = occurrence_draft(&subscription, start);
            let created = self.store.create(&draft, subscription.discounted_amount).await?;

            match self
                .store
                .record_generated_booking(&subscription.id, &source.id, &created.id, next_date)
                .await
            {
                Ok(Some(updated)) => {
                    info!(
                        subscription_id = %updated.id,
                        source_booking_id = %source.id,
                        booking_id = %created.id,
                        next_booking_date = %next_date,
                        occurrences_completed = updated.total_occurrences_completed,
                        "Generated next occurrence"
                    );
                    let payload = json!({
                        "subscription_id": updated.id,
                        "source_booking_id": source.id,
                        "scheduled_start": created.scheduled_start,
                        "local_start": created.local_start(),
                        "amount": created.amount_estimated,
                        "currency": created.currency,
                    });
                    let events = vec![
                        NotificationEvent::new(NotificationKind::RecurringBookingGenerated, &created.id, &created.customer_ref, payload.clone()),
                        NotificationEvent::new(NotificationKind::RecurringBookingGenerated, &created.id, &created.professional_ref, payload),
                    ];
                    return Ok(LifecycleOutput::new(GenerationOutcome::Generated { booking: created }, events));
                }
                Ok(None) => {
                    warn!(subscription_id = %subscription.id, attempt, "Subscription advanced concurrently, recomputing next occurrence");
                    self.discard(&created.id).await;
                }
                Err(AppError::AlreadyGenerated { existing_booking_id }) => {
                    self.discard(&created.id).await;
                    let booking = self.store.get(&existing_booking_id).await?;
                    info!(source_booking_id = %source.id, booking_id = %booking.id, "Generation replayed");
                    return Ok(LifecycleOutput::new(GenerationOutcome::Replayed { booking }, vec![]));
                }
                Err(e) => {
                    self.discard(&created.id).await;
                    return Err(e);
                }
            }
        }

        Err(AppError::InternalWithMsg(format!(
            "Could not record next occurrence for subscription {} after {} attempts",
            subscription_id, MAX_GENERATION_ATTEMPTS
        )))
    }

    async fn replayed(
        &self,
        subscription_id: &str,
        source_booking_id: &str,
    ) -> Result<Option<LifecycleOutput<GenerationOutcome>>, AppError> {
        let Some(record) = self.store.find_generation(subscription_id, source_booking_id).await? else {
            return Ok(None);
        };
        let booking = self.store.get(&record.generated_booking_id).await?;
        Ok(Some(LifecycleOutput::new(GenerationOutcome::Replayed { booking }, vec![])))
    }

    /// First occurrence date after `next_booking_date` whose start is still in
    /// the future, or `None` when the subscription has run its course.
    fn next_slot(&self, subscription: &RecurringSubscription) -> Option<(NaiveDate, DateTime<Utc>)> {
        let now = self.clock.now();
        let weekday = subscription.weekday();
        let mut date = calculate_next_occurrence(subscription.next_booking_date, subscription.frequency, weekday);

        loop {
            if should_terminate_subscription(subscription, date) {
                return None;
            }
            match subscription.occurrence_start(date) {
                Some(start) if start > now => return Some((date, start)),
                _ => date = calculate_next_occurrence(date, subscription.frequency, weekday),
            }
        }
    }

    async fn end_subscription(
        &self,
        subscription: &RecurringSubscription,
        source: &Booking,
    ) -> Result<LifecycleOutput<GenerationOutcome>, AppError> {
        match self
            .store
            .transition_subscription(&subscription.id, SubscriptionStatus::Active, SubscriptionStatus::Completed)
            .await
        {
            Ok(ended) => {
                info!(subscription_id = %ended.id, occurrences = ended.total_occurrences_completed + 1, "Subscription reached its end");
                let event = NotificationEvent::new(
                    NotificationKind::SubscriptionEnded,
                    &source.id,
                    &ended.customer_ref,
                    json!({ "subscription_id": ended.id, "occurrences": ended.total_occurrences_completed + 1 }),
                );
                Ok(LifecycleOutput::new(GenerationOutcome::Skipped { reason: SkipReason::SubscriptionEnded }, vec![event]))
            }
            // Someone else paused, cancelled or ended it first.
            Err(AppError::InvalidTransition { .. }) => Ok(skipped(SkipReason::SubscriptionInactive)),
            Err(e) => Err(e),
        }
    }

    async fn discard(&self, booking_id: &str) {
        if let Err(e) = self.store.delete(booking_id).await {
            warn!(booking_id, "Failed to discard duplicate occurrence: {}", e);
        }
    }
}

fn skipped(reason: SkipReason) -> LifecycleOutput<GenerationOutcome> {
    LifecycleOutput::new(GenerationOutcome::Skipped { reason }, vec![])
}

/// Draft for an occurrence after the first: priced at the discounted amount,
/// left in `pending_payment` until the professional confirms.
fn occurrence_draft(subscription: &RecurringSubscription, start: DateTime<Utc>) -> BookingDraft {
    BookingDraft {
        customer_ref: subscription.customer_ref.clone(),
        professional_ref: subscription.professional_ref.clone(),
        service_name: subscription.service_name.clone(),
        address: subscription.address.clone(),
        instructions: subscription.instructions.clone(),
        scheduled_start: start,
        duration_minutes: subscription.duration_minutes,
        timezone: subscription.timezone.clone(),
        currency: subscription.currency.clone(),
        price: BookingPrice::Fixed { amount: subscription.discounted_amount },
        recurring_plan_id: Some(subscription.id.clone()),
        is_subscription_generated: true,
    }
}
