use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn, info_span, Instrument};
use crate::state::AppState;
use crate::domain::models::outbox::OutboxMessage;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const DELIVERY_BATCH: i64 = 10;
const MAX_DELIVERY_ATTEMPTS: i32 = 5;
const RECONCILE_BATCH: i64 = 20;

pub async fn start_background_worker(state: Arc<AppState>) {
    info!("Starting background worker...");

    loop {
        run_once(&state).await;
        sleep(POLL_INTERVAL).await;
    }
}

/// One worker tick: deliver due notifications, then retry unsettled holds.
pub async fn run_once(state: &Arc<AppState>) {
    deliver_due_notifications(state).await;

    match state.payments.reconcile_unsettled(RECONCILE_BATCH).await {
        Ok(0) => {}
        Ok(settled) => info!(settled, "Reconciliation sweep settled holds"),
        Err(e) => warn!("Reconciliation sweep failed: {}", e),
    }
}

async fn deliver_due_notifications(state: &AppState) {
    let now = state.clock.now();
    let due = match state.outbox.claim_due(now, now + delivery_lease(), DELIVERY_BATCH).await {
        Ok(due) => due,
        Err(e) => {
            error!("Failed to claim outbox messages: {:?}", e);
            return;
        }
    };

    for message in due {
        let span = info_span!(
            "notification_delivery",
            message_id = %message.id,
            event_type = message.event.event_type.as_str(),
            booking_id = %message.booking_id,
            attempt = message.attempts
        );
        deliver(state, &message).instrument(span).await;
    }
}

async fn deliver(state: &AppState, message: &OutboxMessage) {
    let recorded = match state.notifier.emit(&message.event.0).await {
        Ok(()) => {
            info!("Notification delivered");
            state.outbox.mark_delivered(&message.id, state.clock.now()).await
        }
        Err(e) => {
            let retry_at = (message.attempts < MAX_DELIVERY_ATTEMPTS)
                .then(|| state.clock.now() + retry_delay(message.attempts));
            match retry_at {
                Some(at) => warn!(retry_at = %at, "Notification delivery failed, will retry: {}", e),
                None => error!("Notification delivery failed, giving up: {}", e),
            }
            state.outbox.mark_failed(&message.id, &e.to_string(), retry_at).await
        }
    };

    if let Err(e) = recorded {
        error!("Failed to record delivery outcome: {:?}", e);
    }
}

/// How long a claimed message stays with one worker before others may retake it.
fn delivery_lease() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

fn retry_delay(attempts: i32) -> chrono::Duration {
    chrono::Duration::seconds(30i64 << attempts.clamp(0, 6))
}
