use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Deserialize;

use crate::domain::models::actor::Actor;
use crate::domain::models::booking::{BookingDraft, BookingPrice};
use crate::domain::models::subscription::{Frequency, SubscriptionDraft, Termination};

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    /// Defaults to the caller; only administrators may book for someone else.
    pub customer_ref: Option<String>,
    pub professional_ref: String,
    pub service_name: String,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i32,
    pub timezone: String,
    pub currency: String,
    pub price: BookingPrice,
}

impl CreateBookingRequest {
    pub fn into_draft(self, actor: &Actor) -> BookingDraft {
        BookingDraft {
            customer_ref: self.customer_ref.unwrap_or_else(|| actor.reference.clone()),
            professional_ref: self.professional_ref,
            service_name: self.service_name,
            address: self.address,
            instructions: self.instructions,
            scheduled_start: self.scheduled_start,
            duration_minutes: self.duration_minutes,
            timezone: self.timezone,
            currency: self.currency,
            price: self.price,
            recurring_plan_id: None,
            is_subscription_generated: false,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize, Default)]
pub struct DeclineBookingRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RescheduleBookingRequest {
    pub new_start: DateTime<Utc>,
    pub new_duration_minutes: Option<i32>,
}

#[derive(Deserialize, Default)]
pub struct CompleteBookingRequest {
    /// Overrides the captured amount when the final price differs from the hold.
    pub final_amount: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_ref: Option<String>,
    pub professional_ref: String,
    pub frequency: Frequency,
    pub day_of_week: Option<Weekday>,
    pub preferred_time: NaiveTime,
    pub first_date: NaiveDate,
    pub timezone: String,
    pub service_name: String,
    pub hourly_rate: i64,
    pub duration_minutes: i32,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub currency: String,
    pub termination: Termination,
}

impl CreateSubscriptionRequest {
    pub fn into_draft(self, actor: &Actor) -> SubscriptionDraft {
        SubscriptionDraft {
            customer_ref: self.customer_ref.unwrap_or_else(|| actor.reference.clone()),
            professional_ref: self.professional_ref,
            frequency: self.frequency,
            day_of_week: self.day_of_week,
            preferred_time: self.preferred_time,
            first_date: self.first_date,
            timezone: self.timezone,
            service_name: self.service_name,
            hourly_rate: self.hourly_rate,
            duration_minutes: self.duration_minutes,
            address: self.address,
            instructions: self.instructions,
            currency: self.currency,
            termination: self.termination,
        }
    }
}
