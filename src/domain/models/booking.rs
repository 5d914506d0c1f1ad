use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use sqlx::FromRow;
use std::fmt;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Authorized,
    Confirmed,
    InProgress,
    Completed,
    Canceled,
    Declined,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::PendingPayment,
        BookingStatus::Authorized,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Canceled,
        BookingStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Authorized => "authorized",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Canceled => "canceled",
            BookingStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Canceled | BookingStatus::Declined)
    }

    /// Legal iff some event in the lifecycle table moves `self` to `to`.
    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        BookingEvent::ALL.iter().any(|event| event.target(self) == Some(to))
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BookingStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or(UnknownVariant(value))
    }
}

/// Inputs that drive a booking through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEvent {
    HoldAuthorized,
    Confirm,
    Reschedule,
    Cancel,
    CheckIn,
    CheckOut,
    Decline,
}

impl BookingEvent {
    pub const ALL: [BookingEvent; 7] = [
        BookingEvent::HoldAuthorized,
        BookingEvent::Confirm,
        BookingEvent::Reschedule,
        BookingEvent::Cancel,
        BookingEvent::CheckIn,
        BookingEvent::CheckOut,
        BookingEvent::Decline,
    ];

    pub fn target(self, from: BookingStatus) -> Option<BookingStatus> {
        use BookingEvent as E;
        use BookingStatus as S;

        match (from, self) {
            (S::PendingPayment, E::HoldAuthorized) => Some(S::Authorized),
            (S::Authorized, E::Confirm) => Some(S::Confirmed),
            (S::Authorized | S::Confirmed, E::Reschedule) => Some(S::Authorized),
            (S::PendingPayment | S::Authorized | S::Confirmed, E::Cancel) => Some(S::Canceled),
            (S::Confirmed, E::CheckIn) => Some(S::InProgress),
            (S::InProgress, E::CheckOut) => Some(S::Completed),
            (S::PendingPayment | S::Authorized, E::Decline) => Some(S::Declined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEvent::HoldAuthorized => "hold_authorized",
            BookingEvent::Confirm => "confirm",
            BookingEvent::Reschedule => "reschedule",
            BookingEvent::Cancel => "cancel",
            BookingEvent::CheckIn => "check_in",
            BookingEvent::CheckOut => "check_out",
            BookingEvent::Decline => "decline",
        }
    }
}

/// Start, end and duration always move together; `end` is never set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_minutes: i32,
}

impl Schedule {
    pub fn new(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
            duration_minutes,
        }
    }

    pub fn start(&self) -> DateTime<Utc> { self.start }
    pub fn end(&self) -> DateTime<Utc> { self.end }
    pub fn duration_minutes(&self) -> i32 { self.duration_minutes }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Booking {
    pub id: String,
    pub customer_ref: String,
    pub professional_ref: String,
    pub service_name: String,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub duration_minutes: i32,
    pub timezone: String,
    pub currency: String,
    pub amount_estimated: i64,
    pub amount_authorized: i64,
    pub amount_captured: Option<i64>,
    pub payment_hold_ref: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub canceled_reason: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub canceled_by: Option<String>,
    pub refund_percentage: Option<i32>,
    pub refund_amount: Option<i64>,
    pub recurring_plan_id: Option<String>,
    pub is_subscription_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(draft: &BookingDraft, amount_estimated: i64, now: DateTime<Utc>) -> Self {
        let schedule = Schedule::new(draft.scheduled_start, draft.duration_minutes);

        Self {
            id: Uuid::new_v4().to_string(),
            customer_ref: draft.customer_ref.clone(),
            professional_ref: draft.professional_ref.clone(),
            service_name: draft.service_name.clone(),
            address: draft.address.clone(),
            instructions: draft.instructions.clone(),
            scheduled_start: schedule.start(),
            scheduled_end: schedule.end(),
            duration_minutes: schedule.duration_minutes(),
            timezone: draft.timezone.clone(),
            currency: draft.currency.to_uppercase(),
            amount_estimated,
            amount_authorized: 0,
            amount_captured: None,
            payment_hold_ref: None,
            status: BookingStatus::PendingPayment,
            canceled_reason: None,
            canceled_at: None,
            canceled_by: None,
            refund_percentage: None,
            refund_amount: None,
            recurring_plan_id: draft.recurring_plan_id.clone(),
            is_subscription_generated: draft.is_subscription_generated,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.scheduled_start, self.duration_minutes)
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Local wall-clock rendering used in notification payloads.
    pub fn local_start(&self) -> String {
        self.scheduled_start.with_timezone(&self.tz()).format("%Y-%m-%d %H:%M").to_string()
    }

    pub fn is_party(&self, actor_ref: &str) -> bool {
        self.customer_ref == actor_ref || self.professional_ref == actor_ref
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingPrice {
    /// Quoted total in minor units.
    Fixed { amount: i64 },
    /// Per-hour rate in minor units; total is rate x duration, floored at the configured minimum.
    Hourly { rate: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDraft {
    pub customer_ref: String,
    pub professional_ref: String,
    pub service_name: String,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub timezone: String,
    pub currency: String,
    pub price: BookingPrice,
    #[serde(default)]
    pub recurring_plan_id: Option<String>,
    #[serde(default)]
    pub is_subscription_generated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationRecord {
    pub reason: String,
    pub canceled_at: DateTime<Utc>,
    pub canceled_by: String,
    pub refund_percentage: i32,
    pub refund_amount: i64,
}

/// Fields written alongside a status transition. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub schedule: Option<Schedule>,
    pub amount_authorized: Option<i64>,
    pub amount_captured: Option<i64>,
    pub payment_hold_ref: Option<String>,
    pub cancellation: Option<CancellationRecord>,
}

impl BookingPatch {
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_hold(mut self, hold_ref: String, amount_authorized: i64) -> Self {
        self.payment_hold_ref = Some(hold_ref);
        self.amount_authorized = Some(amount_authorized);
        self
    }

    pub fn with_captured(mut self, amount: i64) -> Self {
        self.amount_captured = Some(amount);
        self
    }

    pub fn with_cancellation(mut self, record: CancellationRecord) -> Self {
        self.cancellation = Some(record);
        self
    }
}
