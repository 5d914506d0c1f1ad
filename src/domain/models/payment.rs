use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::UnknownVariant;

/// Local view of a manual-capture hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    RequiresCapture,
    Captured,
    PartiallyRefunded,
    Refunded,
    Voided,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::RequiresCapture => "requires_capture",
            HoldStatus::Captured => "captured",
            HoldStatus::PartiallyRefunded => "partially_refunded",
            HoldStatus::Refunded => "refunded",
            HoldStatus::Voided => "voided",
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, HoldStatus::Captured | HoldStatus::PartiallyRefunded | HoldStatus::Refunded)
    }
}

impl TryFrom<String> for HoldStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "requires_capture" => Ok(HoldStatus::RequiresCapture),
            "captured" => Ok(HoldStatus::Captured),
            "partially_refunded" => Ok(HoldStatus::PartiallyRefunded),
            "refunded" => Ok(HoldStatus::Refunded),
            "voided" => Ok(HoldStatus::Voided),
            _ => Err(UnknownVariant(value)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct PaymentHold {
    pub hold_ref: String,
    pub booking_id: String,
    pub idempotency_key: String,
    pub processor_customer_id: String,
    pub currency: String,
    pub amount_authorized: i64,
    pub amount_captured: i64,
    pub amount_refunded: i64,
    #[sqlx(try_from = "String")]
    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentHold {
    pub fn refundable(&self) -> i64 {
        self.amount_captured - self.amount_refunded
    }
}

/// Maps a customer reference to the processor-side customer record.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct PaymentCustomer {
    pub customer_ref: String,
    pub processor_customer_id: String,
    pub created_at: DateTime<Utc>,
}

/// Status as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorHoldStatus {
    RequiresCapture,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorHold {
    pub hold_ref: String,
    pub amount: i64,
    pub amount_captured: i64,
    pub amount_refunded: i64,
    pub status: ProcessorHoldStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRefund {
    pub refund_ref: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub idempotency_key: String,
    pub booking_id: String,
    pub amount: i64,
    pub currency: String,
    pub processor_customer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureResult {
    pub hold_ref: String,
    pub amount_captured: i64,
    /// True when the hold was already captured and nothing moved this time.
    pub already_captured: bool,
}

/// How funds were returned when a booking ended early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Settlement {
    /// Uncaptured hold released; no money ever moved.
    Voided { released: i64 },
    /// Captured funds returned.
    Refunded { amount: i64 },
    /// The booking never had a hold.
    NoHold,
    /// Status changed but the processor call failed; the reconciliation sweep finishes it.
    Pending { error: String },
}

/// A hold whose booking ended but whose void or refund never landed.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct UnsettledHold {
    #[sqlx(flatten)]
    pub hold: PaymentHold,
    pub booking_refund_amount: Option<i64>,
}
