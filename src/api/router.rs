use axum::{
    body::Body,
    extract::Request,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use crate::state::AppState;
use crate::api::handlers::{booking, health, subscription};
use tower_http::{
    trace::TraceLayer,
    classify::ServerErrorsFailureClass,
};
use tracing::{info_span, Span, error, info};
use uuid::Uuid;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))

        // Bookings
        .route("/api/v1/bookings", post(booking::create_booking))
        .route("/api/v1/bookings/{booking_id}", get(booking::get_booking))
        .route("/api/v1/bookings/{booking_id}/cancellation-policy", get(booking::get_cancellation_policy))
        .route("/api/v1/bookings/{booking_id}/cancel", post(booking::cancel_booking))
        .route("/api/v1/bookings/{booking_id}/reschedule", post(booking::reschedule_booking))
        .route("/api/v1/bookings/{booking_id}/authorize", post(booking::authorize_booking))
        .route("/api/v1/bookings/{booking_id}/confirm", post(booking::confirm_booking))
        .route("/api/v1/bookings/{booking_id}/decline", post(booking::decline_booking))
        .route("/api/v1/bookings/{booking_id}/check-in", post(booking::check_in))
        .route("/api/v1/bookings/{booking_id}/complete", post(booking::complete_booking))
        .route("/api/v1/bookings/{booking_id}/generate-next", post(booking::generate_next))

        // Subscriptions
        .route("/api/v1/subscriptions", post(subscription::create_subscription))
        .route("/api/v1/subscriptions/{subscription_id}", get(subscription::get_subscription))
        .route("/api/v1/subscriptions/{subscription_id}/pause", post(subscription::pause_subscription))
        .route("/api/v1/subscriptions/{subscription_id}/resume", post(subscription::resume_subscription))
        .route("/api/v1/subscriptions/{subscription_id}/cancel", post(subscription::cancel_subscription))

        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = Uuid::new_v4().to_string();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        version = ?request.version(),
                        actor_ref = tracing::field::Empty,
                    )
                })
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("started processing request: {} {}", request.method(), request.uri().path());
                })
                .on_response(|response: &axum::http::Response<Body>, latency: Duration, _span: &Span| {
                    info!(
                        status = response.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "finished processing request"
                    );
                })
                .on_failure(|error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                    error!("request failed: {:?}", error);
                })
        )
        .with_state(state)
}
