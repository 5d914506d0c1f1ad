use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sqlx::{postgres::{PgPoolOptions, PgConnectOptions}, sqlite::{SqlitePoolOptions, SqliteJournalMode, SqliteConnectOptions}};
use sqlx::{PgPool, SqlitePool, ConnectOptions};
use tracing::info;
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::error::AppError;
use crate::state::{Adapters, AppState};
use crate::infra::auth::jwt_identity::JwtIdentityProvider;
use crate::infra::clock::SystemClock;
use crate::infra::notifications::http_notification_emitter::HttpNotificationEmitter;
use crate::infra::payments::http_payment_processor::HttpPaymentProcessor;
use crate::infra::repositories::{
    postgres_booking_repo::PostgresBookingRepo, postgres_outbox_repo::PostgresOutboxRepo,
    postgres_payment_repo::PostgresPaymentRepo, postgres_subscription_repo::PostgresSubscriptionRepo,
    sqlite_booking_repo::SqliteBookingRepo, sqlite_outbox_repo::SqliteOutboxRepo,
    sqlite_payment_repo::SqlitePaymentRepo, sqlite_subscription_repo::SqliteSubscriptionRepo,
};

const PAYMENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub async fn bootstrap_state(config: &Config) -> Result<AppState, AppError> {
    let database_url = &config.database_url;
    let processor = Arc::new(HttpPaymentProcessor::new(
        config.payment_api_url.clone(),
        config.payment_api_key.clone(),
        PAYMENT_REQUEST_TIMEOUT,
    )?);
    let notifier = Arc::new(HttpNotificationEmitter::new(
        config.notification_webhook_url.clone(),
        config.notification_webhook_token.clone(),
    ));
    let identity = Arc::new(JwtIdentityProvider::new(&config.jwt_secret, config.auth_issuer.clone()));
    let clock = Arc::new(SystemClock);

    let adapters = if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Initializing PostgreSQL connection...");

        let mut opts: PgConnectOptions = database_url
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid Postgres URL: {}", e)))?;
        opts = opts.log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await?;

        run_postgres_migrations(&pool).await?;

        Adapters {
            booking_repo: Arc::new(PostgresBookingRepo::new(pool.clone())),
            subscription_repo: Arc::new(PostgresSubscriptionRepo::new(pool.clone())),
            payment_repo: Arc::new(PostgresPaymentRepo::new(pool.clone())),
            outbox: Arc::new(PostgresOutboxRepo::new(pool.clone())),
            processor,
            notifier,
            identity,
            clock,
        }
    } else {
        info!("Initializing SQLite connection with WAL Mode...");

        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        run_sqlite_migrations(&pool).await?;

        Adapters {
            booking_repo: Arc::new(SqliteBookingRepo::new(pool.clone())),
            subscription_repo: Arc::new(SqliteSubscriptionRepo::new(pool.clone())),
            payment_repo: Arc::new(SqlitePaymentRepo::new(pool.clone())),
            outbox: Arc::new(SqliteOutboxRepo::new(pool.clone())),
            processor,
            notifier,
            identity,
            clock,
        }
    };

    Ok(AppState::new(config.clone(), adapters))
}

async fn run_postgres_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .map_err(|e| AppError::InternalWithMsg(format!("Postgres migrations failed: {}", e)))
}

pub async fn run_sqlite_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .map_err(|e| AppError::InternalWithMsg(format!("SQLite migrations failed: {}", e)))
}
