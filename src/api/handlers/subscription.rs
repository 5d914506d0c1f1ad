use axum::{extract::{State, Path}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::dtos::requests::CreateSubscriptionRequest;
use crate::api::extractors::auth::AuthActor;
use crate::api::handlers::enqueue_notifications;
use crate::error::AppError;
use std::sync::Arc;

pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let draft = payload.into_draft(&actor);
    let output = state.lifecycle.create_subscription(&draft, &actor).await?;
    enqueue_notifications(&state, output.events).await;
    Ok((StatusCode::CREATED, Json(output.value)))
}

pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.lifecycle.get_subscription(&subscription_id, &actor).await?))
}

pub async fn pause_subscription(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.lifecycle.pause_subscription(&subscription_id, &actor).await?))
}

pub async fn resume_subscription(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.lifecycle.resume_subscription(&subscription_id, &actor).await?))
}

pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.lifecycle.cancel_subscription(&subscription_id, &actor).await?))
}
