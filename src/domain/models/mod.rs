pub mod actor;
pub mod booking;
pub mod notification;
pub mod outbox;
pub mod payment;
pub mod subscription;

use thiserror::Error;

/// Raised when a text column holds a value no enum variant maps to.
#[derive(Debug, Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
