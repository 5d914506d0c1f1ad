use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::domain::models::booking::BookingStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Cancellation refused by the time/status rule. Carries the computed refund
    /// figures so the caller can still show them.
    #[error("Cancellation blocked: {reason}")]
    PolicyBlocked {
        reason: String,
        refund_percentage: u8,
        refund_amount: i64,
        hours_until_service: Option<f64>,
    },
    #[error("Booking is {actual:?}, expected {expected}")]
    ConflictingTransition {
        expected: BookingStatus,
        actual: Option<BookingStatus>,
    },
    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: String, to: String },
    #[error("{field} must be in the future")]
    PastDate { field: &'static str },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid hold state: {0}")]
    InvalidHoldState(String),

    #[error("Card declined: {0}")]
    CardDeclined(String),
    #[error("Payment processor unavailable: {0}")]
    ProcessorUnavailable(String),
    #[error("Payment outcome unknown, reconciliation required: {0}")]
    AmbiguousOutcome(String),

    #[error("Next occurrence already generated as {existing_booking_id}")]
    AlreadyGenerated { existing_booking_id: String },

    #[error("Internal server error")]
    Internal,
    #[error("Internal server error: {0}")]
    InternalWithMsg(String),
}

impl AppError {
    /// Stable machine-readable discriminator used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::PolicyBlocked { .. } => "policy_blocked",
            AppError::ConflictingTransition { .. } => "conflicting_transition",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::PastDate { .. } => "past_date",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::InvalidHoldState(_) => "invalid_hold_state",
            AppError::CardDeclined(_) => "card_declined",
            AppError::ProcessorUnavailable(_) => "processor_unavailable",
            AppError::AmbiguousOutcome(_) => "ambiguous_outcome",
            AppError::AlreadyGenerated { .. } => "already_generated",
            AppError::Internal | AppError::InternalWithMsg(_) => "internal",
        }
    }

    /// True for errors raised by the payment processor boundary.
    pub fn is_processor_error(&self) -> bool {
        matches!(
            self,
            AppError::CardDeclined(_) | AppError::ProcessorUnavailable(_) | AppError::AmbiguousOutcome(_)
        )
    }
}

/// SQLite reports 2067 (UNIQUE) or 1555 (PRIMARY KEY), PostgreSQL 23505.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code == "2067" || code == "1555" || code == "23505")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, body) = match &self {
            AppError::Database(e) => {
                if is_unique_violation(e) {
                    return (
                        StatusCode::CONFLICT,
                        Json(json!({ "error": "Resource already exists (duplicate entry)", "kind": kind })),
                    )
                        .into_response();
                }
                error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal server error" }))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::PolicyBlocked { reason, refund_percentage, refund_amount, hours_until_service } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": reason,
                    "refund_percentage": refund_percentage,
                    "refund_amount": refund_amount,
                    "hours_until_service": hours_until_service,
                }),
            ),
            AppError::ConflictingTransition { expected, actual } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "expected": expected, "actual": actual }),
            ),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "from": from, "to": to }),
            ),
            AppError::PastDate { field } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "field": field }),
            ),
            AppError::InvalidAmount(msg) | AppError::InvalidHoldState(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::CardDeclined(msg) => (StatusCode::PAYMENT_REQUIRED, json!({ "error": msg })),
            AppError::ProcessorUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::AmbiguousOutcome(msg) => {
                error!("Ambiguous payment outcome: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, json!({ "error": msg }))
            }
            AppError::AlreadyGenerated { existing_booking_id } => (
                StatusCode::CONFLICT,
                json!({ "error": self.to_string(), "existing_booking_id": existing_booking_id }),
            ),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal error" })),
            AppError::InternalWithMsg(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal error" }))
            }
        };

        let mut body = body;
        body["kind"] = json!(kind);
        (status, Json(body)).into_response()
    }
}
