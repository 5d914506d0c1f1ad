use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::notification::NotificationEvent;
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    /// Taken by a worker; becomes claimable again once the lease runs out.
    Claimed,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Claimed,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Claimed => "claimed",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for DeliveryStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == value)
            .ok_or(UnknownVariant(value))
    }
}

/// A lifecycle notification written alongside the state change it describes
/// and handed to the emitter by the background worker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxMessage {
    pub id: String,
    pub booking_id: String,
    pub event: Json<NotificationEvent>,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub deliver_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(event: NotificationEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            booking_id: event.booking_id.clone(),
            event: Json(event),
            status: DeliveryStatus::Pending,
            attempts: 0,
            deliver_after: now,
            last_error: None,
            created_at: now,
            delivered_at: None,
        }
    }
}
