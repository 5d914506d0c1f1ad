#![allow(dead_code)]

use booking_engine::{
    api::router::create_router,
    config::{Config, PolicyConfig, RetryPolicy},
    domain::models::{
        actor::{Actor, ActorRole},
        booking::{BookingDraft, BookingPrice},
        notification::NotificationEvent,
        payment::{AuthorizeRequest, ProcessorHold, ProcessorHoldStatus, ProcessorRefund},
    },
    domain::ports::{Clock, NotificationEmitter, PaymentProcessor},
    error::AppError,
    infra::auth::jwt_identity::JwtIdentityProvider,
    infra::repositories::{
        sqlite_booking_repo::SqliteBookingRepo, sqlite_outbox_repo::SqliteOutboxRepo,
        sqlite_payment_repo::SqlitePaymentRepo, sqlite_subscription_repo::SqliteSubscriptionRepo,
    },
    state::{Adapters, AppState},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use sqlx::{sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, Pool, Sqlite};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

pub const CUSTOMER: &str = "cust-1";
pub const PROFESSIONAL: &str = "pro-1";
pub const ADMIN: &str = "ops-1";

/// Monday 2026-03-02 09:00 UTC.
pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn customer() -> Actor {
    Actor::new(CUSTOMER, ActorRole::Customer)
}

pub fn professional() -> Actor {
    Actor::new(PROFESSIONAL, ActorRole::Professional)
}

pub fn admin() -> Actor {
    Actor::new(ADMIN, ActorRole::Admin)
}

pub fn booking_draft(start: DateTime<Utc>, amount: i64) -> BookingDraft {
    BookingDraft {
        customer_ref: CUSTOMER.to_string(),
        professional_ref: PROFESSIONAL.to_string(),
        service_name: "Deep clean".to_string(),
        address: Some("12 Harbour Road".to_string()),
        instructions: None,
        scheduled_start: start,
        duration_minutes: 120,
        timezone: "America/New_York".to_string(),
        currency: "usd".to_string(),
        price: BookingPrice::Fixed { amount },
        recurring_plan_id: None,
        is_subscription_generated: false,
    }
}

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    /// The processor applied the call but the response never arrived.
    TimeoutAfterApply,
    /// The processor never saw the call and the response timed out.
    TimeoutBeforeApply,
    Declined,
}

#[derive(Default)]
struct ProcessorState {
    holds: HashMap<String, ProcessorHold>,
    by_key: HashMap<String, String>,
    customers: HashMap<String, String>,
    refunds: HashMap<String, ProcessorRefund>,
    failures: HashMap<&'static str, VecDeque<Failure>>,
    calls: HashMap<&'static str, usize>,
    partial_amount: Option<i64>,
    lookups_fail: bool,
}

/// In-memory card processor that honours idempotency keys and can be
/// scripted to fail per operation.
#[derive(Default)]
pub struct MockPaymentProcessor {
    state: Mutex<ProcessorState>,
}

impl MockPaymentProcessor {
    pub fn fail_next(&self, operation: &'static str, failure: Failure, times: usize) {
        let mut state = self.state.lock().unwrap();
        let queue = state.failures.entry(operation).or_default();
        for _ in 0..times {
            queue.push_back(failure);
        }
    }

    pub fn authorize_partially(&self, amount: i64) {
        self.state.lock().unwrap().partial_amount = Some(amount);
    }

    pub fn break_lookups(&self) {
        self.state.lock().unwrap().lookups_fail = true;
    }

    pub fn restore_lookups(&self) {
        self.state.lock().unwrap().lookups_fail = false;
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn hold_count(&self) -> usize {
        self.state.lock().unwrap().holds.len()
    }

    pub fn hold(&self, hold_ref: &str) -> Option<ProcessorHold> {
        self.state.lock().unwrap().holds.get(hold_ref).cloned()
    }

    /// Records the call and pops the next scripted failure for `operation`.
    fn begin(&self, operation: &'static str) -> Option<Failure> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_default() += 1;
        state.failures.get_mut(operation).and_then(|q| q.pop_front())
    }

    fn lookup_guard(&self) -> Result<(), AppError> {
        if self.state.lock().unwrap().lookups_fail {
            return Err(AppError::ProcessorUnavailable("lookup offline".into()));
        }
        Ok(())
    }

    /// Runs `apply` unless a failure is scripted, mapping the failure to the
    /// error the HTTP adapter would raise.
    fn run<T>(&self, operation: &'static str, apply: impl FnOnce(&mut ProcessorState) -> Result<T, AppError>) -> Result<T, AppError> {
        match self.begin(operation) {
            None => apply(&mut self.state.lock().unwrap()),
            Some(Failure::Unavailable) => Err(AppError::ProcessorUnavailable(format!("{} refused", operation))),
            Some(Failure::Declined) => Err(AppError::CardDeclined("insufficient_funds".into())),
            Some(Failure::TimeoutBeforeApply) => Err(AppError::AmbiguousOutcome(format!("{} timed out", operation))),
            Some(Failure::TimeoutAfterApply) => {
                apply(&mut self.state.lock().unwrap())?;
                Err(AppError::AmbiguousOutcome(format!("{} timed out", operation)))
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_customer(&self, customer_ref: &str, _idempotency_key: &str) -> Result<String, AppError> {
        self.run("create_customer", |state| {
            Ok(state
                .customers
                .entry(customer_ref.to_string())
                .or_insert_with(|| format!("cus_{}", Uuid::new_v4().simple()))
                .clone())
        })
    }

    async fn authorize(&self, request: &AuthorizeRequest) -> Result<ProcessorHold, AppError> {
        self.run("authorize", |state| {
            if let Some(existing) = state.by_key.get(&request.idempotency_key) {
                return Ok(state.holds[existing].clone());
            }
            let hold = ProcessorHold {
                hold_ref: format!("pi_{}", Uuid::new_v4().simple()),
                amount: state.partial_amount.unwrap_or(request.amount),
                amount_captured: 0,
                amount_refunded: 0,
                status: ProcessorHoldStatus::RequiresCapture,
            };
            state.by_key.insert(request.idempotency_key.clone(), hold.hold_ref.clone());
            state.holds.insert(hold.hold_ref.clone(), hold.clone());
            Ok(hold)
        })
    }

    async fn capture(&self, hold_ref: &str, amount: i64, _idempotency_key: &str) -> Result<ProcessorHold, AppError> {
        self.run("capture", |state| {
            let hold = state
                .holds
                .get_mut(hold_ref)
                .ok_or_else(|| AppError::NotFound(hold_ref.to_string()))?;
            match hold.status {
                ProcessorHoldStatus::Succeeded => Ok(hold.clone()),
                ProcessorHoldStatus::Canceled => Err(AppError::InvalidHoldState("hold canceled".into())),
                ProcessorHoldStatus::RequiresCapture => {
                    hold.amount_captured = amount;
                    hold.status = ProcessorHoldStatus::Succeeded;
                    Ok(hold.clone())
                }
            }
        })
    }

    async fn void(&self, hold_ref: &str, _idempotency_key: &str) -> Result<ProcessorHold, AppError> {
        self.run("void", |state| {
            let hold = state
                .holds
                .get_mut(hold_ref)
                .ok_or_else(|| AppError::NotFound(hold_ref.to_string()))?;
            if hold.status == ProcessorHoldStatus::Succeeded {
                return Err(AppError::InvalidHoldState("hold already captured".into()));
            }
            hold.status = ProcessorHoldStatus::Canceled;
            Ok(hold.clone())
        })
    }

    async fn refund(&self, hold_ref: &str, amount: i64, idempotency_key: &str) -> Result<ProcessorRefund, AppError> {
        self.run("refund", |state| {
            if let Some(existing) = state.refunds.get(idempotency_key) {
                return Ok(existing.clone());
            }
            let hold = state
                .holds
                .get_mut(hold_ref)
                .ok_or_else(|| AppError::NotFound(hold_ref.to_string()))?;
            if hold.amount_refunded + amount > hold.amount_captured {
                return Err(AppError::InvalidHoldState("refund exceeds captured amount".into()));
            }
            hold.amount_refunded += amount;
            let refund = ProcessorRefund { refund_ref: format!("re_{}", Uuid::new_v4().simple()), amount };
            state.refunds.insert(idempotency_key.to_string(), refund.clone());
            Ok(refund)
        })
    }

    async fn retrieve(&self, hold_ref: &str) -> Result<ProcessorHold, AppError> {
        self.lookup_guard()?;
        self.state
            .lock()
            .unwrap()
            .holds
            .get(hold_ref)
            .cloned()
            .ok_or_else(|| AppError::NotFound(hold_ref.to_string()))
    }

    async fn find_by_idempotency_key(&self, idempotency_key: &str) -> Result<Option<ProcessorHold>, AppError> {
        self.lookup_guard()?;
        let state = self.state.lock().unwrap();
        Ok(state.by_key.get(idempotency_key).map(|hold_ref| state.holds[hold_ref].clone()))
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<NotificationEvent>>,
    failures: Mutex<usize>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Rejects the next `times` deliveries.
    pub fn fail_next(&self, times: usize) {
        *self.failures.lock().unwrap() += times;
    }
}

#[async_trait]
impl NotificationEmitter for RecordingEmitter {
    async fn emit(&self, event: &NotificationEvent) -> Result<(), AppError> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(AppError::InternalWithMsg("webhook returned 503".into()));
        }
        drop(failures);
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
    pub processor: Arc<MockPaymentProcessor>,
    pub emitter: Arc<RecordingEmitter>,
    pub clock: Arc<FixedClock>,
    pub identity: Arc<JwtIdentityProvider>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to migrate test db");

        let config = Config {
            database_url: db_url.clone(),
            port: 0,
            payment_api_url: "http://localhost".to_string(),
            payment_api_key: "sk_test".to_string(),
            notification_webhook_url: "http://localhost".to_string(),
            notification_webhook_token: "token".to_string(),
            jwt_secret: "test-secret".to_string(),
            auth_issuer: "test-issuer".to_string(),
            policy: PolicyConfig::default(),
            retry: RetryPolicy { max_attempts: 3, base_delay: std::time::Duration::from_millis(1) },
        };

        let processor = Arc::new(MockPaymentProcessor::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let clock = Arc::new(FixedClock::new(start_of_test()));
        let identity = Arc::new(JwtIdentityProvider::new(&config.jwt_secret, config.auth_issuer.clone()));

        let state = Arc::new(AppState::new(
            config,
            Adapters {
                booking_repo: Arc::new(SqliteBookingRepo::new(pool.clone())),
                subscription_repo: Arc::new(SqliteSubscriptionRepo::new(pool.clone())),
                payment_repo: Arc::new(SqlitePaymentRepo::new(pool.clone())),
                outbox: Arc::new(SqliteOutboxRepo::new(pool.clone())),
                processor: processor.clone(),
                notifier: emitter.clone(),
                identity: identity.clone(),
                clock: clock.clone(),
            },
        ));

        let router = create_router(state.clone());

        Self {
            router,
            pool,
            db_filename,
            state,
            processor,
            emitter,
            clock,
            identity,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn token(&self, actor: &Actor) -> String {
        self.identity.issue(actor, Duration::hours(1)).unwrap()
    }

    pub async fn request(&self, method: &str, uri: &str, actor: Option<&Actor>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(actor) = actor {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(actor)));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    pub async fn booking_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_filename));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_filename));
    }
}
