pub mod auth;
pub mod clock;
pub mod factory;
pub mod notifications;
pub mod payments;
pub mod repositories;
