use booking_engine::{
    domain::models::notification::{NotificationEvent, NotificationKind},
    domain::models::outbox::{DeliveryStatus, OutboxMessage},
    domain::ports::NotificationOutbox,
    infra::repositories::postgres_outbox_repo::PostgresOutboxRepo,
};
use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

const MESSAGES: usize = 60;
const WORKERS: usize = 8;

/// Needs a Postgres `DATABASE_URL`; SQLite serializes writers so there is no race to test.
#[tokio::test]
async fn test_concurrent_workers_never_share_a_message() {
    let db_url = std::env::var("DATABASE_URL").unwrap_or_default();
    if !db_url.starts_with("postgres") {
        println!("DATABASE_URL is not Postgres, skipping outbox claim race");
        return;
    }

    let pool = PgPoolOptions::new().max_connections(WORKERS as u32 + 2).connect(&db_url).await.unwrap();
    sqlx::migrate!("./migrations/postgres").run(&pool).await.unwrap();

    // Messages from this run only, so leftovers from other runs don't count.
    let booking_id = format!("claim-race-{}", uuid::Uuid::new_v4());
    let outbox = Arc::new(PostgresOutboxRepo::new(pool.clone()));
    let now = Utc::now();
    for seq in 0..MESSAGES {
        let event = NotificationEvent::new(
            NotificationKind::BookingRescheduled,
            &booking_id,
            "cust-1",
            serde_json::json!({ "seq": seq }),
        );
        outbox.enqueue(&OutboxMessage::new(event, now - Duration::seconds(1))).await.unwrap();
    }

    let mut set = JoinSet::new();
    for _ in 0..WORKERS {
        let outbox = Arc::clone(&outbox);
        let booking_id = booking_id.clone();
        set.spawn(async move {
            let mut delivered = Vec::new();
            loop {
                let now = Utc::now();
                let batch = outbox.claim_due(now, now + Duration::minutes(5), 4).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                for message in batch.into_iter().filter(|m| m.booking_id == booking_id) {
                    outbox.mark_delivered(&message.id, Utc::now()).await.unwrap();
                    delivered.push(message.id);
                }
            }
            delivered
        });
    }

    let mut claims: HashMap<String, usize> = HashMap::new();
    while let Some(res) = set.join_next().await {
        for id in res.unwrap() {
            *claims.entry(id).or_default() += 1;
        }
    }

    assert_eq!(claims.len(), MESSAGES);
    assert!(claims.values().all(|&n| n == 1), "a message was delivered by two workers");

    let stored = outbox.list_for_booking(&booking_id).await.unwrap();
    assert!(stored.iter().all(|m| m.status == DeliveryStatus::Delivered && m.attempts == 1));

    sqlx::query("DELETE FROM notification_outbox WHERE booking_id = $1")
        .bind(&booking_id)
        .execute(&pool)
        .await
        .unwrap();
}
