mod common;

use std::sync::Arc;

use booking_engine::domain::models::booking::{Booking, BookingStatus};
use booking_engine::domain::models::notification::NotificationKind;
use booking_engine::domain::models::subscription::{Frequency, SubscriptionDraft, SubscriptionStatus, Termination};
use booking_engine::domain::services::recurrence::{GenerationOutcome, SkipReason};
use booking_engine::error::AppError;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use common::{admin, customer, professional, TestApp, CUSTOMER, PROFESSIONAL};
use tokio::task::JoinSet;

fn weekly_draft(termination: Termination) -> SubscriptionDraft {
    SubscriptionDraft {
        customer_ref: CUSTOMER.to_string(),
        professional_ref: PROFESSIONAL.to_string(),
        frequency: Frequency::Weekly,
        day_of_week: Some(Weekday::Thu),
        preferred_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        first_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
        timezone: "America/New_York".to_string(),
        service_name: "Weekly clean".to_string(),
        hourly_rate: 4000,
        duration_minutes: 120,
        address: Some("12 Harbour Road".to_string()),
        instructions: None,
        currency: "usd".to_string(),
        termination,
    }
}

/// Confirms, checks in and completes `booking`, returning what came next.
async fn run_occurrence(app: &TestApp, booking: &Booking) -> Option<GenerationOutcome> {
    let lifecycle = &app.state.lifecycle;
    lifecycle.confirm_booking(&booking.id, &professional()).await.unwrap();
    lifecycle.check_in(&booking.id, &professional()).await.unwrap();
    lifecycle
        .complete_booking(&booking.id, &professional(), None)
        .await
        .unwrap()
        .value
        .next
}

#[tokio::test]
async fn test_subscription_prices_first_occurrence_with_discount() {
    let app = TestApp::new().await;

    let output = app
        .state
        .lifecycle
        .create_subscription(&weekly_draft(Termination::Occurrences { total_count: 4 }), &customer())
        .await
        .unwrap();
    let created = output.value;

    // 40.00/h for two hours, less the weekly 15%.
    assert_eq!(created.subscription.discount_percentage, 15);
    assert_eq!(created.subscription.discounted_amount, 6800);
    assert_eq!(created.subscription.status, SubscriptionStatus::Active);

    let first = created.first_booking;
    assert_eq!(first.status, BookingStatus::Authorized);
    assert_eq!(first.amount_authorized, 6800);
    assert_eq!(first.recurring_plan_id.as_deref(), Some(created.subscription.id.as_str()));
    assert!(!first.is_subscription_generated);
    // 10:00 in New York before DST starts.
    assert_eq!(first.scheduled_start, Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap());
}

#[tokio::test]
async fn test_completion_survives_failed_generation() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;
    let first = lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value
        .first_booking;
    lifecycle.confirm_booking(&first.id, &professional()).await.unwrap();
    lifecycle.check_in(&first.id, &professional()).await.unwrap();

    sqlx::query("DROP TABLE subscription_generations").execute(&app.pool).await.unwrap();

    let output = lifecycle.complete_booking(&first.id, &professional(), None).await.unwrap();
    assert_eq!(output.value.booking.status, BookingStatus::Completed);
    assert!(output.value.next.is_none());
    assert!(output.value.generation_error.is_some());

    let completed: Vec<_> = output
        .events
        .iter()
        .filter(|e| e.event_type == NotificationKind::BookingCompleted)
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].recipient_ref, CUSTOMER);
    assert_eq!(app.processor.calls("capture"), 1);
}

#[tokio::test]
async fn test_subscription_first_date_must_match_weekday() {
    let app = TestApp::new().await;
    let mut draft = weekly_draft(Termination::Never);
    draft.first_date = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();

    let err = app.state.lifecycle.create_subscription(&draft, &customer()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_weekly_subscription_runs_to_its_count() {
    let app = TestApp::new().await;
    let created = app
        .state
        .lifecycle
        .create_subscription(&weekly_draft(Termination::Occurrences { total_count: 4 }), &customer())
        .await
        .unwrap()
        .value;
    let subscription_id = created.subscription.id.clone();

    let expected_starts = [
        Utc.with_ymd_and_hms(2026, 3, 12, 14, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 19, 14, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 26, 14, 0, 0).unwrap(),
    ];

    let mut current = created.first_booking;
    for expected_start in expected_starts {
        let next = match run_occurrence(&app, &current).await {
            Some(GenerationOutcome::Generated { booking }) => booking,
            other => panic!("expected a generated occurrence, got {:?}", other),
        };
        assert_eq!(next.status, BookingStatus::PendingPayment);
        assert!(next.is_subscription_generated);
        assert_eq!(next.amount_estimated, 6800);
        assert_eq!(next.scheduled_start, expected_start);
        current = next;
    }

    match run_occurrence(&app, &current).await {
        Some(GenerationOutcome::Skipped { reason }) => assert_eq!(reason, SkipReason::SubscriptionEnded),
        other => panic!("expected the subscription to end, got {:?}", other),
    }

    let detail = app.state.lifecycle.get_subscription(&subscription_id, &customer()).await.unwrap();
    assert_eq!(detail.subscription.status, SubscriptionStatus::Completed);
    assert_eq!(detail.subscription.total_occurrences_completed, 3);
    assert_eq!(detail.bookings.len(), 4);
    assert!(detail.bookings.iter().all(|b| b.status == BookingStatus::Completed));

    let again = app.state.lifecycle.generate_next(&current.id, &admin()).await.unwrap();
    assert!(matches!(again.value, GenerationOutcome::Skipped { reason: SkipReason::SubscriptionEnded }));
    assert_eq!(app.booking_count().await, 4);
}

#[tokio::test]
async fn test_generation_is_at_most_once_per_source() {
    let app = TestApp::new().await;
    let created = app
        .state
        .lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;

    let generated = match run_occurrence(&app, &created.first_booking).await {
        Some(GenerationOutcome::Generated { booking }) => booking,
        other => panic!("expected a generated occurrence, got {:?}", other),
    };

    for _ in 0..3 {
        let replay = app.state.lifecycle.generate_next(&created.first_booking.id, &admin()).await.unwrap();
        match replay.value {
            GenerationOutcome::Replayed { booking } => assert_eq!(booking.id, generated.id),
            other => panic!("expected a replay, got {:?}", other),
        }
        assert!(replay.events.is_empty());
    }

    let bookings = app.state.store.list_by_subscription(&created.subscription.id).await.unwrap();
    assert_eq!(bookings.len(), 2);
    let subscription = app.state.store.get_subscription(&created.subscription.id).await.unwrap();
    assert_eq!(subscription.total_occurrences_completed, 1);
}

#[tokio::test]
async fn test_concurrent_generation_creates_one_successor() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;
    let created = lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;
    let subscription_id = created.subscription.id.clone();

    // Pause so completion itself does not generate.
    lifecycle.pause_subscription(&subscription_id, &customer()).await.unwrap();
    match run_occurrence(&app, &created.first_booking).await {
        Some(GenerationOutcome::Skipped { reason }) => assert_eq!(reason, SkipReason::SubscriptionInactive),
        other => panic!("expected a skip while paused, got {:?}", other),
    }
    lifecycle.resume_subscription(&subscription_id, &customer()).await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..5 {
        let lifecycle = Arc::clone(&app.state.lifecycle);
        let source_id = created.first_booking.id.clone();
        set.spawn(async move { lifecycle.generate_next(&source_id, &admin()).await });
    }

    let mut successor_ids = Vec::new();
    let mut generated = 0;
    while let Some(res) = set.join_next().await {
        let outcome = res.unwrap().unwrap().value;
        if matches!(outcome, GenerationOutcome::Generated { .. }) {
            generated += 1;
        }
        successor_ids.push(outcome.booking().unwrap().id.clone());
    }

    assert_eq!(generated, 1);
    successor_ids.dedup();
    assert_eq!(successor_ids.len(), 1);

    let bookings = app.state.store.list_by_subscription(&subscription_id).await.unwrap();
    assert_eq!(bookings.len(), 2);
    let subscription = app.state.store.get_subscription(&subscription_id).await.unwrap();
    assert_eq!(subscription.total_occurrences_completed, 1);
}

#[tokio::test]
async fn test_generated_occurrence_notifies_both_parties() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;
    let created = lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;

    lifecycle.confirm_booking(&created.first_booking.id, &professional()).await.unwrap();
    lifecycle.check_in(&created.first_booking.id, &professional()).await.unwrap();
    let output = lifecycle.complete_booking(&created.first_booking.id, &professional(), None).await.unwrap();

    let generated: Vec<_> = output
        .events
        .iter()
        .filter(|e| e.event_type == NotificationKind::RecurringBookingGenerated)
        .map(|e| e.recipient_ref.as_str())
        .collect();
    assert_eq!(generated, vec![CUSTOMER, PROFESSIONAL]);
    assert!(output.events.iter().any(|e| e.event_type == NotificationKind::BookingCompleted));
}

#[tokio::test]
async fn test_generated_occurrence_authorizes_on_confirm() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;
    let created = lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;

    let next = match run_occurrence(&app, &created.first_booking).await {
        Some(GenerationOutcome::Generated { booking }) => booking,
        other => panic!("expected a generated occurrence, got {:?}", other),
    };
    assert!(next.payment_hold_ref.is_none());

    let confirmed = lifecycle.confirm_booking(&next.id, &professional()).await.unwrap().value;
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.amount_authorized, 6800);
    assert!(confirmed.payment_hold_ref.is_some());
}

#[tokio::test]
async fn test_generation_requires_completed_source() {
    let app = TestApp::new().await;
    let created = app
        .state
        .lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;

    let err = app
        .state
        .lifecycle
        .generate_next(&created.first_booking.id, &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = app
        .state
        .lifecycle
        .generate_next(&created.first_booking.id, &customer())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_cancelled_subscription_cannot_resume() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.lifecycle;
    let created = lifecycle
        .create_subscription(&weekly_draft(Termination::Never), &customer())
        .await
        .unwrap()
        .value;
    let id = created.subscription.id;

    let cancelled = lifecycle.cancel_subscription(&id, &customer()).await.unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);

    let err = lifecycle.resume_subscription(&id, &customer()).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    match run_occurrence(&app, &created.first_booking).await {
        Some(GenerationOutcome::Skipped { reason }) => assert_eq!(reason, SkipReason::SubscriptionInactive),
        other => panic!("expected a skip, got {:?}", other),
    }
}

#[tokio::test]
async fn test_end_date_stops_generation() {
    let app = TestApp::new().await;
    let end_date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
    let created = app
        .state
        .lifecycle
        .create_subscription(&weekly_draft(Termination::Date { end_date }), &customer())
        .await
        .unwrap()
        .value;

    let second = match run_occurrence(&app, &created.first_booking).await {
        Some(GenerationOutcome::Generated { booking }) => booking,
        other => panic!("expected a generated occurrence, got {:?}", other),
    };
    assert_eq!(second.scheduled_start, Utc.with_ymd_and_hms(2026, 3, 12, 14, 0, 0).unwrap());

    match run_occurrence(&app, &second).await {
        Some(GenerationOutcome::Skipped { reason }) => assert_eq!(reason, SkipReason::SubscriptionEnded),
        other => panic!("expected the subscription to end, got {:?}", other),
    }
}
