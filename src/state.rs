use std::sync::Arc;
use crate::domain::ports::{
    BookingRepository, Clock, IdentityProvider, NotificationEmitter, NotificationOutbox, PaymentProcessor,
    PaymentRepository, SubscriptionRepository,
};
use crate::domain::services::{
    booking_store::BookingStore, lifecycle::BookingLifecycleService, payment_hold::PaymentHoldManager,
    policy::PolicyCalculator, recurrence::RecurrenceGenerator,
};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub lifecycle: Arc<BookingLifecycleService>,
    pub store: Arc<BookingStore>,
    pub payments: Arc<PaymentHoldManager>,
    pub outbox: Arc<dyn NotificationOutbox>,
    pub notifier: Arc<dyn NotificationEmitter>,
    pub identity: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Storage and outside-world implementations the services are wired over.
pub struct Adapters {
    pub booking_repo: Arc<dyn BookingRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub outbox: Arc<dyn NotificationOutbox>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub notifier: Arc<dyn NotificationEmitter>,
    pub identity: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, adapters: Adapters) -> Self {
        let clock = adapters.clock;
        let store = Arc::new(BookingStore::new(adapters.booking_repo, adapters.subscription_repo, clock.clone()));
        let payments = Arc::new(PaymentHoldManager::new(
            adapters.processor,
            adapters.payment_repo,
            clock.clone(),
            config.retry,
        ));
        let policy = Arc::new(PolicyCalculator::new(config.policy.clone()));
        let recurrence = Arc::new(RecurrenceGenerator::new(store.clone(), clock.clone()));
        let lifecycle = Arc::new(BookingLifecycleService::new(
            store.clone(),
            payments.clone(),
            policy,
            recurrence,
            clock.clone(),
        ));

        Self {
            config,
            lifecycle,
            store,
            payments,
            outbox: adapters.outbox,
            notifier: adapters.notifier,
            identity: adapters.identity,
            clock,
        }
    }
}
