use serde::Serialize;

use crate::domain::models::booking::Booking;
use crate::domain::models::notification::NotificationKind;
use crate::domain::models::outbox::{DeliveryStatus, OutboxMessage};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct BookingWithNotifications {
    pub booking: Booking,
    pub notifications: Vec<NotificationSummary>,
}

#[derive(Serialize)]
pub struct NotificationSummary {
    pub id: String,
    pub event_type: NotificationKind,
    pub recipient_ref: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
}

impl From<OutboxMessage> for NotificationSummary {
    fn from(message: OutboxMessage) -> Self {
        Self {
            id: message.id,
            event_type: message.event.event_type,
            recipient_ref: message.event.recipient_ref.clone(),
            status: message.status,
            attempts: message.attempts,
        }
    }
}
