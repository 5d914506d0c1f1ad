pub mod booking;
pub mod health;
pub mod subscription;

use tracing::error;

use crate::domain::models::notification::NotificationEvent;
use crate::domain::models::outbox::OutboxMessage;
use crate::state::AppState;

/// Writes lifecycle notifications to the outbox. A failed write is logged
/// and dropped; the state change it describes is already committed.
pub(crate) async fn enqueue_notifications(state: &AppState, events: Vec<NotificationEvent>) {
    let now = state.clock.now();
    for event in events {
        let message = OutboxMessage::new(event, now);
        if let Err(e) = state.outbox.enqueue(&message).await {
            error!(
                event_type = message.event.event_type.as_str(),
                booking_id = %message.booking_id,
                "Failed to enqueue notification: {}",
                e
            );
        }
    }
}
