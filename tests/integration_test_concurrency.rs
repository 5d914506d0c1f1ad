mod common;

use std::sync::Arc;

use booking_engine::domain::models::booking::{BookingEvent, BookingPatch, BookingStatus};
use booking_engine::error::AppError;
use chrono::Duration;
use common::{booking_draft, customer, professional, TestApp};
use tokio::task::JoinSet;

async fn force_status(app: &TestApp, booking_id: &str, status: BookingStatus) {
    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(booking_id)
        .execute(&app.pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_store_enforces_transition_table() {
    let app = TestApp::new().await;
    let store = &app.state.store;
    let start = app.now() + Duration::days(3);

    for from in BookingStatus::ALL {
        for event in BookingEvent::ALL {
            let booking = store.create(&booking_draft(start, 10_000), 10_000).await.unwrap();
            force_status(&app, &booking.id, from).await;

            match event.target(from) {
                Some(to) => {
                    let moved = store.transition(&booking.id, from, to, BookingPatch::default()).await.unwrap();
                    assert_eq!(moved.status, to, "{} on {}", event.as_str(), from);

                    // The same move again lost its precondition.
                    if from != to {
                        let err = store
                            .transition(&booking.id, from, to, BookingPatch::default())
                            .await
                            .unwrap_err();
                        assert!(
                            matches!(err, AppError::ConflictingTransition { actual: Some(actual), .. } if actual == to),
                            "{} on {}: {:?}",
                            event.as_str(),
                            from,
                            err
                        );
                    }
                }
                None => {
                    for to in BookingStatus::ALL.into_iter().filter(|to| !from.can_transition_to(*to)) {
                        let err = store
                            .transition(&booking.id, from, to, BookingPatch::default())
                            .await
                            .unwrap_err();
                        assert!(matches!(err, AppError::InvalidTransition { .. }), "{} -> {}", from, to);
                    }
                    let unchanged = store.get(&booking.id).await.unwrap();
                    assert_eq!(unchanged.status, from);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_concurrent_confirms_have_one_winner() {
    let app = TestApp::new().await;
    let booking = app
        .state
        .store
        .create(&booking_draft(app.now() + Duration::days(3), 10_000), 10_000)
        .await
        .unwrap();
    force_status(&app, &booking.id, BookingStatus::Authorized).await;

    let mut set = JoinSet::new();
    for _ in 0..10 {
        let store = Arc::clone(&app.state.store);
        let id = booking.id.clone();
        set.spawn(async move {
            store
                .transition(&id, BookingStatus::Authorized, BookingStatus::Confirmed, BookingPatch::default())
                .await
        });
    }

    let mut winners = 0;
    while let Some(res) = set.join_next().await {
        match res.unwrap() {
            Ok(b) => {
                assert_eq!(b.status, BookingStatus::Confirmed);
                winners += 1;
            }
            Err(AppError::ConflictingTransition { expected, actual }) => {
                assert_eq!(expected, BookingStatus::Authorized);
                assert_eq!(actual, Some(BookingStatus::Confirmed));
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_cancel_racing_cancel_settles_once() {
    let app = TestApp::new().await;
    let booking = app
        .state
        .lifecycle
        .create_booking(&booking_draft(app.now() + Duration::days(5), 40_000), &customer())
        .await
        .unwrap()
        .value;

    let mut set = JoinSet::new();
    for actor in [customer(), professional()] {
        let lifecycle = Arc::clone(&app.state.lifecycle);
        let id = booking.id.clone();
        set.spawn(async move { lifecycle.cancel_booking(&id, &actor, "").await });
    }

    let mut successes = 0;
    while let Some(res) = set.join_next().await {
        match res.unwrap() {
            Ok(_) => successes += 1,
            // The loser either lost the swap or saw the booking already canceled.
            Err(AppError::ConflictingTransition { .. }) | Err(AppError::PolicyBlocked { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(app.processor.calls("void"), 1);
    let canceled = app.state.store.get(&booking.id).await.unwrap();
    assert_eq!(canceled.status, BookingStatus::Canceled);
}
