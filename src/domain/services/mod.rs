pub mod booking_store;
pub mod lifecycle;
pub mod payment_hold;
pub mod policy;
pub mod recurrence;
