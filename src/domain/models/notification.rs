use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingAuthorized,
    BookingConfirmed,
    BookingDeclined,
    BookingCanceled,
    BookingRescheduled,
    BookingCompleted,
    RecurringBookingGenerated,
    SubscriptionEnded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingAuthorized => "booking_authorized",
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingDeclined => "booking_declined",
            NotificationKind::BookingCanceled => "booking_canceled",
            NotificationKind::BookingRescheduled => "booking_rescheduled",
            NotificationKind::BookingCompleted => "booking_completed",
            NotificationKind::RecurringBookingGenerated => "recurring_booking_generated",
            NotificationKind::SubscriptionEnded => "subscription_ended",
        }
    }
}

/// Side-effect request produced by the lifecycle; delivery is the caller's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: NotificationKind,
    pub booking_id: String,
    pub recipient_ref: String,
    pub payload: Value,
}

impl NotificationEvent {
    pub fn new(event_type: NotificationKind, booking_id: &str, recipient_ref: &str, payload: Value) -> Self {
        Self {
            event_type,
            booking_id: booking_id.to_string(),
            recipient_ref: recipient_ref.to_string(),
            payload,
        }
    }
}

/// A lifecycle result plus the notifications it asks the caller to deliver.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutput<T> {
    pub value: T,
    pub events: Vec<NotificationEvent>,
}

impl<T> LifecycleOutput<T> {
    pub fn new(value: T, events: Vec<NotificationEvent>) -> Self {
        Self { value, events }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LifecycleOutput<U> {
        LifecycleOutput { value: f(self.value), events: self.events }
    }
}
