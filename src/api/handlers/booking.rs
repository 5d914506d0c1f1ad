use axum::{extract::{State, Path}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::dtos::requests::{
    CancelBookingRequest, CompleteBookingRequest, CreateBookingRequest, DeclineBookingRequest, RescheduleBookingRequest,
};
use crate::api::dtos::responses::{BookingWithNotifications, NotificationSummary};
use crate::api::extractors::auth::AuthActor;
use crate::api::handlers::enqueue_notifications;
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let draft = payload.into_draft(&actor);
    let output = state.lifecycle.create_booking(&draft, &actor).await?;
    info!(booking_id = %output.value.id, "Booking created via API");

    enqueue_notifications(&state, output.events).await;
    Ok((StatusCode::CREATED, Json(output.value)))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.lifecycle.get_booking(&booking_id, &actor).await?;
    let notifications = state.outbox.list_for_booking(&booking.id).await?
        .into_iter()
        .map(NotificationSummary::from)
        .collect();

    Ok(Json(BookingWithNotifications { booking, notifications }))
}

pub async fn get_cancellation_policy(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let preview = state.lifecycle.preview_cancellation(&booking_id, &actor).await?;
    Ok(Json(preview))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
    Json(payload): Json<CancelBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.cancel_booking(&booking_id, &actor, &payload.reason).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
    Json(payload): Json<RescheduleBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle
        .reschedule_booking(&booking_id, &actor, payload.new_start, payload.new_duration_minutes)
        .await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn authorize_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.authorize_booking(&booking_id, &actor).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.confirm_booking(&booking_id, &actor).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn decline_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
    Json(payload): Json<DeclineBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.decline_booking(&booking_id, &actor, payload.reason).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn check_in(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.check_in(&booking_id, &actor).await?;
    Ok(Json(output.value))
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
    Json(payload): Json<CompleteBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.complete_booking(&booking_id, &actor, payload.final_amount).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}

pub async fn generate_next(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let output = state.lifecycle.generate_next(&booking_id, &actor).await?;
    enqueue_notifications(&state, output.events).await;
    Ok(Json(output.value))
}
