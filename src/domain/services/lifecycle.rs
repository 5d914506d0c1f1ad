use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::models::actor::Actor;
use crate::domain::models::booking::{
    Booking, BookingDraft, BookingEvent, BookingPatch, BookingPrice, BookingStatus, CancellationRecord, Schedule,
};
use crate::domain::models::notification::{LifecycleOutput, NotificationEvent, NotificationKind};
use crate::domain::models::payment::Settlement;
use crate::domain::models::subscription::{RecurringSubscription, SubscriptionDraft, SubscriptionStatus, Termination};
use crate::domain::ports::Clock;
use crate::domain::services::booking_store::BookingStore;
use crate::domain::services::payment_hold::PaymentHoldManager;
use crate::domain::services::policy::{calculate_refund_amount, CancellationPolicyResult, PolicyCalculator};
use crate::domain::services::recurrence::{GenerationOutcome, RecurrenceGenerator};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refund_percentage: u8,
    pub refund_amount: i64,
    pub settlement: Settlement,
    /// Caller-facing copy; differs between a released hold and a refund.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationPreview {
    pub booking_id: String,
    pub policy: CancellationPolicyResult,
    pub refund_amount: i64,
    /// True while the hold is uncaptured: a cancellation would release it rather than refund.
    pub would_void: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub booking: Booking,
    pub next: Option<GenerationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCreated {
    pub subscription: RecurringSubscription,
    pub first_booking: Booking,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDetail {
    pub subscription: RecurringSubscription,
    pub bookings: Vec<Booking>,
}

/// Orchestrates the booking state machine over the store, the payment hold
/// manager and the recurrence generator. Notifications are returned, never sent.
pub struct BookingLifecycleService {
    store: Arc<BookingStore>,
    payments: Arc<PaymentHoldManager>,
    policy: Arc<PolicyCalculator>,
    recurrence: Arc<RecurrenceGenerator>,
    clock: Arc<dyn Clock>,
}

impl BookingLifecycleService {
    pub fn new(
        store: Arc<BookingStore>,
        payments: Arc<PaymentHoldManager>,
        policy: Arc<PolicyCalculator>,
        recurrence: Arc<RecurrenceGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, payments, policy, recurrence, clock }
    }

    pub async fn get_booking(&self, booking_id: &str, actor: &Actor) -> Result<Booking, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_party(&booking, actor)?;
        Ok(booking)
    }

    pub async fn create_booking(&self, draft: &BookingDraft, actor: &Actor) -> Result<LifecycleOutput<Booking>, AppError> {
        if !actor.is_admin() && actor.reference != draft.customer_ref {
            return Err(AppError::Forbidden("Bookings can only be created for yourself".into()));
        }
        if draft.scheduled_start <= self.clock.now() {
            return Err(AppError::PastDate { field: "scheduled_start" });
        }

        let amount = self.policy.booking_amount(&draft.price, draft.duration_minutes)?;
        let pending = self.store.create(draft, amount).await?;

        let booking = match self.place_hold(&pending).await {
            Ok(booking) => booking,
            Err(e @ AppError::AmbiguousOutcome(_)) => {
                warn!(booking_id = %pending.id, "Authorization outcome unknown, booking left pending for reconciliation");
                return Err(e);
            }
            Err(e) => {
                warn!(booking_id = %pending.id, kind = e.kind(), "Authorization failed, removing pending booking");
                if let Err(delete_err) = self.store.delete(&pending.id).await {
                    error!(booking_id = %pending.id, "Failed to remove pending booking: {}", delete_err);
                }
                return Err(e);
            }
        };

        info!(booking_id = %booking.id, amount = booking.amount_authorized, "Booking created and authorized");
        let event = NotificationEvent::new(
            NotificationKind::BookingCreated,
            &booking.id,
            &booking.professional_ref,
            booking_payload(&booking),
        );
        Ok(LifecycleOutput::new(booking, vec![event]))
    }

    /// Places the hold on a `pending_payment` booking, e.g. a generated
    /// occurrence or a first booking whose authorization ended ambiguously.
    pub async fn authorize_booking(&self, booking_id: &str, actor: &Actor) -> Result<LifecycleOutput<Booking>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_party(&booking, actor)?;
        target(&booking, BookingEvent::HoldAuthorized)?;
        if booking.scheduled_start <= self.clock.now() {
            return Err(AppError::PastDate { field: "scheduled_start" });
        }

        let booking = self.place_hold(&booking).await?;
        let event = NotificationEvent::new(
            NotificationKind::BookingAuthorized,
            &booking.id,
            &booking.professional_ref,
            booking_payload(&booking),
        );
        Ok(LifecycleOutput::new(booking, vec![event]))
    }

    /// Professional acceptance. A `pending_payment` occurrence is authorized first.
    pub async fn confirm_booking(&self, booking_id: &str, actor: &Actor) -> Result<LifecycleOutput<Booking>, AppError> {
        let mut booking = self.store.get(booking_id).await?;
        ensure_professional(&booking, actor)?;

        if booking.status == BookingStatus::PendingPayment {
            if booking.scheduled_start <= self.clock.now() {
                return Err(AppError::PastDate { field: "scheduled_start" });
            }
            booking = self.place_hold(&booking).await?;
        }

        let to = target(&booking, BookingEvent::Confirm)?;
        let booking = self.store.transition(&booking.id, booking.status, to, BookingPatch::default()).await?;
        let event = NotificationEvent::new(
            NotificationKind::BookingConfirmed,
            &booking.id,
            &booking.customer_ref,
            booking_payload(&booking),
        );
        Ok(LifecycleOutput::new(booking, vec![event]))
    }

    pub async fn decline_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<LifecycleOutput<CancellationOutcome>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_professional(&booking, actor)?;
        let to = target(&booking, BookingEvent::Decline)?;

        let record = CancellationRecord {
            reason: reason.unwrap_or_else(|| "Declined by professional".to_string()),
            canceled_at: self.clock.now(),
            canceled_by: actor.reference.clone(),
            refund_percentage: 100,
            refund_amount: booking.amount_authorized,
        };
        let declined = self
            .store
            .transition(&booking.id, booking.status, to, BookingPatch::default().with_cancellation(record))
            .await?;

        let settlement = self.settle(&declined, declined.amount_authorized).await;
        let event = NotificationEvent::new(
            NotificationKind::BookingDeclined,
            &declined.id,
            &declined.customer_ref,
            json!({ "reason": declined.canceled_reason, "local_start": declined.local_start(), "settlement": settlement }),
        );
        let outcome = CancellationOutcome {
            message: settlement_message("declined", &settlement, &declined),
            refund_percentage: 100,
            refund_amount: declined.amount_authorized,
            booking: declined,
            settlement,
        };
        Ok(LifecycleOutput::new(outcome, vec![event]))
    }

    pub async fn check_in(&self, booking_id: &str, actor: &Actor) -> Result<LifecycleOutput<Booking>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_professional(&booking, actor)?;
        let to = target(&booking, BookingEvent::CheckIn)?;
        let booking = self.store.transition(&booking.id, booking.status, to, BookingPatch::default()).await?;
        Ok(LifecycleOutput::new(booking, vec![]))
    }

    pub async fn preview_cancellation(&self, booking_id: &str, actor: &Actor) -> Result<CancellationPreview, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_party(&booking, actor)?;

        let policy = self.cancellation_policy(&booking);
        let refund_amount = calculate_refund_amount(booking.amount_authorized, policy.refund_percentage);
        let would_void = match &booking.payment_hold_ref {
            Some(hold_ref) => !self.payments.find_hold(hold_ref).await?.status.is_captured(),
            None => false,
        };

        Ok(CancellationPreview { booking_id: booking.id, policy, refund_amount, would_void })
    }

    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<LifecycleOutput<CancellationOutcome>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_party(&booking, actor)?;

        let policy = self.cancellation_policy(&booking);
        let refund_amount = calculate_refund_amount(booking.amount_authorized, policy.refund_percentage);
        if !policy.can_cancel {
            return Err(AppError::PolicyBlocked {
                reason: policy.reason,
                refund_percentage: policy.refund_percentage,
                refund_amount,
                hours_until_service: policy.hours_until_service,
            });
        }

        let record = CancellationRecord {
            reason: if reason.trim().is_empty() { policy.reason.clone() } else { reason.to_string() },
            canceled_at: self.clock.now(),
            canceled_by: actor.reference.clone(),
            refund_percentage: policy.refund_percentage as i32,
            refund_amount,
        };
        let canceled = self
            .store
            .transition(&booking.id, booking.status, BookingStatus::Canceled, BookingPatch::default().with_cancellation(record))
            .await?;

        let settlement = self.settle(&canceled, refund_amount).await;
        info!(
            booking_id = %canceled.id,
            refund_percentage = policy.refund_percentage,
            refund_amount,
            ?settlement,
            "Booking canceled"
        );

        let payload = json!({
            "reason": canceled.canceled_reason,
            "canceled_by": actor.reference,
            "local_start": canceled.local_start(),
            "refund_percentage": policy.refund_percentage,
            "refund_amount": refund_amount,
            "currency": canceled.currency,
            "settlement": settlement,
        });
        let events = counterparties(&canceled, actor)
            .into_iter()
            .map(|recipient| NotificationEvent::new(NotificationKind::BookingCanceled, &canceled.id, recipient, payload.clone()))
            .collect();

        let outcome = CancellationOutcome {
            message: settlement_message("canceled", &settlement, &canceled),
            refund_percentage: policy.refund_percentage,
            refund_amount,
            booking: canceled,
            settlement,
        };
        Ok(LifecycleOutput::new(outcome, events))
    }

    /// Moves the booking to a new slot and back to `authorized`, so the
    /// professional has to confirm again. The hold is kept.
    pub async fn reschedule_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        new_start: DateTime<Utc>,
        new_duration_minutes: Option<i32>,
    ) -> Result<LifecycleOutput<Booking>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_party(&booking, actor)?;

        if new_start <= self.clock.now() {
            return Err(AppError::PastDate { field: "new_start" });
        }
        let duration = new_duration_minutes.unwrap_or(booking.duration_minutes);
        if duration <= 0 {
            return Err(AppError::Validation("new_duration_minutes must be positive".into()));
        }
        let to = target(&booking, BookingEvent::Reschedule)?;

        let old = booking.schedule();
        let new = Schedule::new(new_start, duration);
        let rescheduled = self
            .store
            .transition(&booking.id, booking.status, to, BookingPatch::default().with_schedule(new))
            .await?;

        let payload = json!({
            "old_start": old.start(),
            "old_end": old.end(),
            "new_start": new.start(),
            "new_end": new.end(),
            "local_start": rescheduled.local_start(),
            "rescheduled_by": actor.reference,
        });
        let events = counterparties(&rescheduled, actor)
            .into_iter()
            .map(|recipient| NotificationEvent::new(NotificationKind::BookingRescheduled, &rescheduled.id, recipient, payload.clone()))
            .collect();
        Ok(LifecycleOutput::new(rescheduled, events))
    }

    /// Captures the hold, completes the booking and spawns the next occurrence
    /// for recurring bookings. Re-running on a completed booking only replays
    /// the recurrence step.
    pub async fn complete_booking(
        &self,
        booking_id: &str,
        actor: &Actor,
        final_amount: Option<i64>,
    ) -> Result<LifecycleOutput<CompletionOutcome>, AppError> {
        let booking = self.store.get(booking_id).await?;
        ensure_professional(&booking, actor)?;

        let (completed, mut events) = if booking.status == BookingStatus::Completed {
            info!(booking_id = %booking.id, "Completion replayed");
            (booking, vec![])
        } else {
            let to = target(&booking, BookingEvent::CheckOut)?;
            let hold_ref = booking
                .payment_hold_ref
                .as_deref()
                .ok_or_else(|| AppError::InvalidHoldState(format!("Booking {} has no payment hold to capture", booking.id)))?;
            let capture = self.payments.capture(hold_ref, final_amount).await?;

            let completed = match self
                .store
                .transition(&booking.id, booking.status, to, BookingPatch::default().with_captured(capture.amount_captured))
                .await
            {
                Ok(completed) => completed,
                Err(AppError::ConflictingTransition { actual: Some(BookingStatus::Completed), .. }) => {
                    self.store.get(&booking.id).await?
                }
                Err(e) => return Err(e),
            };

            let event = NotificationEvent::new(
                NotificationKind::BookingCompleted,
                &completed.id,
                &completed.customer_ref,
                json!({ "amount_captured": completed.amount_captured, "currency": completed.currency }),
            );
            (completed, vec![event])
        };

        // The booking is already completed; a failed generation is reported
        // alongside it and can be replayed through `generate_next`.
        let mut generation_error = None;
        let next = if completed.recurring_plan_id.is_some() {
            match self.recurrence.generate_next(&completed.id).await {
                Ok(generated) => {
                    events.extend(generated.events);
                    Some(generated.value)
                }
                Err(e) => {
                    error!(booking_id = %completed.id, kind = e.kind(), "Next occurrence not generated: {}", e);
                    generation_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        Ok(LifecycleOutput::new(CompletionOutcome { booking: completed, next, generation_error }, events))
    }

    pub async fn generate_next(
        &self,
        completed_booking_id: &str,
        actor: &Actor,
    ) -> Result<LifecycleOutput<GenerationOutcome>, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden("Only administrators can trigger generation".into()));
        }
        self.recurrence.generate_next(completed_booking_id).await
    }

    pub async fn create_subscription(
        &self,
        draft: &SubscriptionDraft,
        actor: &Actor,
    ) -> Result<LifecycleOutput<SubscriptionCreated>, AppError> {
        if !actor.is_admin() && actor.reference != draft.customer_ref {
            return Err(AppError::Forbidden("Subscriptions can only be created for yourself".into()));
        }
        validate_subscription_draft(draft)?;

        let base = self.policy.booking_amount(&BookingPrice::Hourly { rate: draft.hourly_rate }, draft.duration_minutes)?;
        let (discount_percentage, discounted_amount) = self.policy.discounted_amount(draft.frequency, base);
        let subscription = RecurringSubscription::new(draft, discount_percentage as i32, discounted_amount, self.clock.now());

        let first_start = subscription
            .occurrence_start(draft.first_date)
            .ok_or_else(|| AppError::Validation("preferred_time does not exist on first_date in that timezone".into()))?;
        if first_start <= self.clock.now() {
            return Err(AppError::PastDate { field: "first_date" });
        }

        let subscription = self.store.create_subscription(&subscription).await?;
        info!(
            subscription_id = %subscription.id,
            frequency = subscription.frequency.as_str(),
            base_amount = base,
            discounted_amount,
            "Subscription created"
        );

        let first_draft = BookingDraft {
            customer_ref: subscription.customer_ref.clone(),
            professional_ref: subscription.professional_ref.clone(),
            service_name: subscription.service_name.clone(),
            address: subscription.address.clone(),
            instructions: subscription.instructions.clone(),
            scheduled_start: first_start,
            duration_minutes: subscription.duration_minutes,
            timezone: subscription.timezone.clone(),
            currency: subscription.currency.clone(),
            price: BookingPrice::Fixed { amount: discounted_amount },
            recurring_plan_id: Some(subscription.id.clone()),
            is_subscription_generated: false,
        };

        match self.create_booking(&first_draft, actor).await {
            Ok(output) => Ok(output.map(|first_booking| SubscriptionCreated { subscription, first_booking })),
            Err(e @ AppError::AmbiguousOutcome(_)) => Err(e),
            Err(e) => {
                warn!(subscription_id = %subscription.id, kind = e.kind(), "First occurrence failed, cancelling subscription");
                if let Err(cancel_err) = self
                    .store
                    .transition_subscription(&subscription.id, SubscriptionStatus::Active, SubscriptionStatus::Cancelled)
                    .await
                {
                    error!(subscription_id = %subscription.id, "Failed to cancel orphaned subscription: {}", cancel_err);
                }
                Err(e)
            }
        }
    }

    pub async fn get_subscription(&self, subscription_id: &str, actor: &Actor) -> Result<SubscriptionDetail, AppError> {
        let subscription = self.owned_subscription(subscription_id, actor).await?;
        let bookings = self.store.list_by_subscription(&subscription.id).await?;
        Ok(SubscriptionDetail { subscription, bookings })
    }

    pub async fn pause_subscription(&self, subscription_id: &str, actor: &Actor) -> Result<RecurringSubscription, AppError> {
        let subscription = self.owned_subscription(subscription_id, actor).await?;
        self.store
            .transition_subscription(&subscription.id, SubscriptionStatus::Active, SubscriptionStatus::Paused)
            .await
    }

    pub async fn resume_subscription(&self, subscription_id: &str, actor: &Actor) -> Result<RecurringSubscription, AppError> {
        let subscription = self.owned_subscription(subscription_id, actor).await?;
        self.store
            .transition_subscription(&subscription.id, SubscriptionStatus::Paused, SubscriptionStatus::Active)
            .await
    }

    pub async fn cancel_subscription(&self, subscription_id: &str, actor: &Actor) -> Result<RecurringSubscription, AppError> {
        let subscription = self.owned_subscription(subscription_id, actor).await?;
        self.store
            .transition_subscription(&subscription.id, subscription.status, SubscriptionStatus::Cancelled)
            .await
    }

    async fn owned_subscription(&self, subscription_id: &str, actor: &Actor) -> Result<RecurringSubscription, AppError> {
        let subscription = self.store.get_subscription(subscription_id).await?;
        if !actor.is_admin() && subscription.customer_ref != actor.reference {
            return Err(AppError::Forbidden("Not your subscription".into()));
        }
        Ok(subscription)
    }

    fn cancellation_policy(&self, booking: &Booking) -> CancellationPolicyResult {
        self.policy
            .calculate_cancellation_policy(Some(booking.scheduled_start), booking.status, self.clock.now())
    }

    async fn place_hold(&self, booking: &Booking) -> Result<Booking, AppError> {
        let customer_id = self.payments.ensure_customer(&booking.customer_ref).await?;
        let hold = self
            .payments
            .authorize(&booking.id, booking.amount_estimated, &booking.currency, &customer_id)
            .await?;

        let patch = BookingPatch::default().with_hold(hold.hold_ref.clone(), hold.amount_authorized);
        match self
            .store
            .transition(&booking.id, BookingStatus::PendingPayment, BookingStatus::Authorized, patch)
            .await
        {
            Ok(authorized) => Ok(authorized),
            Err(e) => {
                // The booking moved on without us; release what we just reserved.
                warn!(booking_id = %booking.id, hold_ref = %hold.hold_ref, "Booking left pending_payment during authorization");
                if let Err(void_err) = self.payments.void_or_refund(&hold.hold_ref, 0).await {
                    error!(hold_ref = %hold.hold_ref, "Failed to release orphaned hold: {}", void_err);
                }
                Err(e)
            }
        }
    }

    /// Best effort: the status change is already committed, so a processor
    /// failure is reported as `Pending` and left to the reconciliation sweep.
    /// A booking without a recorded hold may still have one at the processor
    /// if its authorization timed out, so the processor is asked first.
    async fn settle(&self, booking: &Booking, refund_amount: i64) -> Settlement {
        let result = match booking.payment_hold_ref.as_deref() {
            Some(hold_ref) => self.payments.void_or_refund(hold_ref, refund_amount).await,
            None => {
                self.payments
                    .release_unrecorded(&booking.id, &booking.customer_ref, &booking.currency)
                    .await
            }
        };
        match result {
            Ok(settlement) => settlement,
            Err(e) => {
                error!(
                    booking_id = %booking.id,
                    hold_ref = ?booking.payment_hold_ref,
                    kind = e.kind(),
                    "Settlement deferred to reconciliation: {}",
                    e
                );
                Settlement::Pending { error: e.to_string() }
            }
        }
    }
}

fn target(booking: &Booking, event: BookingEvent) -> Result<BookingStatus, AppError> {
    event.target(booking.status).ok_or_else(|| AppError::InvalidTransition {
        from: booking.status.to_string(),
        to: event.as_str().to_string(),
    })
}

fn ensure_party(booking: &Booking, actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() || booking.is_party(&actor.reference) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not a party to this booking".into()))
    }
}

fn ensure_professional(booking: &Booking, actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() || booking.professional_ref == actor.reference {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the assigned professional can do this".into()))
    }
}

/// Who hears about a change made by `actor`: the other side, or both sides
/// when an administrator acted.
fn counterparties<'a>(booking: &'a Booking, actor: &Actor) -> Vec<&'a str> {
    if actor.reference == booking.customer_ref {
        vec![booking.professional_ref.as_str()]
    } else if actor.reference == booking.professional_ref {
        vec![booking.customer_ref.as_str()]
    } else {
        vec![booking.customer_ref.as_str(), booking.professional_ref.as_str()]
    }
}

fn booking_payload(booking: &Booking) -> serde_json::Value {
    json!({
        "service_name": booking.service_name,
        "scheduled_start": booking.scheduled_start,
        "local_start": booking.local_start(),
        "duration_minutes": booking.duration_minutes,
        "amount": booking.amount_estimated,
        "currency": booking.currency,
        "status": booking.status,
    })
}

fn settlement_message(verb: &str, settlement: &Settlement, booking: &Booking) -> String {
    match settlement {
        Settlement::Voided { .. } => format!(
            "Booking {}. The payment hold was released and no money was taken.",
            verb
        ),
        Settlement::Refunded { amount: 0 } => format!("Booking {}. No refund applies at this notice.", verb),
        Settlement::Refunded { amount } => format!(
            "Booking {}. A refund of {} {} has been issued.",
            verb,
            format_minor(*amount),
            booking.currency
        ),
        Settlement::NoHold => format!("Booking {}. No payment had been taken.", verb),
        Settlement::Pending { .. } => format!("Booking {}. The payment release is being processed.", verb),
    }
}

fn format_minor(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, (amount % 100).abs())
}

fn validate_subscription_draft(draft: &SubscriptionDraft) -> Result<(), AppError> {
    if draft.hourly_rate <= 0 {
        return Err(AppError::InvalidAmount(format!("hourly_rate must be positive, got {}", draft.hourly_rate)));
    }
    if draft.duration_minutes <= 0 {
        return Err(AppError::Validation("duration_minutes must be positive".into()));
    }
    if draft.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(AppError::Validation(format!("Unknown timezone '{}'", draft.timezone)));
    }
    if let Some(weekday) = draft.day_of_week {
        use chrono::Datelike;
        if draft.first_date.weekday() != weekday {
            return Err(AppError::Validation(format!("first_date does not fall on {}", weekday)));
        }
    }
    match draft.termination {
        Termination::Occurrences { total_count } if total_count == 0 => {
            Err(AppError::Validation("total_count must be at least 1".into()))
        }
        Termination::Date { end_date } if end_date < draft.first_date => {
            Err(AppError::Validation("end_date is before first_date".into()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::actor::ActorRole;
    use chrono::TimeZone;

    fn booking() -> Booking {
        let draft = BookingDraft {
            customer_ref: "cust-1".into(),
            professional_ref: "pro-1".into(),
            service_name: "Window cleaning".into(),
            address: None,
            instructions: None,
            scheduled_start: Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap(),
            duration_minutes: 90,
            timezone: "UTC".into(),
            currency: "usd".into(),
            price: BookingPrice::Fixed { amount: 12_000 },
            recurring_plan_id: None,
            is_subscription_generated: false,
        };
        Booking::new(&draft, 12_000, Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_counterparties() {
        let b = booking();
        assert_eq!(counterparties(&b, &Actor::new("cust-1", ActorRole::Customer)), vec!["pro-1"]);
        assert_eq!(counterparties(&b, &Actor::new("pro-1", ActorRole::Professional)), vec!["cust-1"]);
        assert_eq!(counterparties(&b, &Actor::new("ops", ActorRole::Admin)), vec!["cust-1", "pro-1"]);
    }

    #[test]
    fn test_party_checks() {
        let b = booking();
        assert!(ensure_party(&b, &Actor::new("cust-1", ActorRole::Customer)).is_ok());
        assert!(ensure_party(&b, &Actor::new("stranger", ActorRole::Customer)).is_err());
        assert!(ensure_professional(&b, &Actor::new("cust-1", ActorRole::Customer)).is_err());
        assert!(ensure_professional(&b, &Actor::new("ops", ActorRole::Admin)).is_ok());
    }

    #[test]
    fn test_illegal_event_reports_current_status() {
        let b = booking();
        match target(&b, BookingEvent::CheckIn) {
            Err(AppError::InvalidTransition { from, to }) => {
                assert_eq!(from, "pending_payment");
                assert_eq!(to, "check_in");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_void_and_refund_copy_differ() {
        let b = booking();
        let voided = settlement_message("canceled", &Settlement::Voided { released: 12_000 }, &b);
        let refunded = settlement_message("canceled", &Settlement::Refunded { amount: 6_000 }, &b);
        assert!(voided.contains("released"));
        assert!(refunded.contains("60.00 USD"));
    }
}
