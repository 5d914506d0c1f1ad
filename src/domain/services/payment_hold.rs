use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::config::RetryPolicy;
use crate::domain::models::payment::{
    AuthorizeRequest, CaptureResult, HoldStatus, PaymentCustomer, PaymentHold, ProcessorHold, ProcessorHoldStatus,
    ProcessorRefund, Settlement,
};
use crate::domain::ports::{Clock, PaymentProcessor, PaymentRepository};
use crate::error::AppError;

/// Places, captures and releases manual-capture holds. Every processor call is
/// keyed so a retry can never move money twice, and every call is logged
/// before and after the round trip.
pub struct PaymentHoldManager {
    processor: Arc<dyn PaymentProcessor>,
    repo: Arc<dyn PaymentRepository>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl PaymentHoldManager {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        repo: Arc<dyn PaymentRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self { processor, repo, clock, retry }
    }

    /// Processor-side customer for `customer_ref`, created on first use.
    pub async fn ensure_customer(&self, customer_ref: &str) -> Result<String, AppError> {
        if let Some(existing) = self.repo.find_customer(customer_ref).await? {
            return Ok(existing.processor_customer_id);
        }

        let key = format!("customer:{}", customer_ref);
        // Creating a customer moves no money, so an ambiguous result is simply retried under the same key.
        let processor_customer_id = self
            .call_processor(
                "create_customer",
                &key,
                || self.processor.create_customer(customer_ref, &key),
                || async { Ok::<Option<String>, AppError>(None) },
                true,
            )
            .await?;

        let saved = self
            .repo
            .insert_customer(&PaymentCustomer {
                customer_ref: customer_ref.to_string(),
                processor_customer_id,
                created_at: self.clock.now(),
            })
            .await?;
        info!(customer_ref, processor_customer_id = %saved.processor_customer_id, "Payment customer mapped");
        Ok(saved.processor_customer_id)
    }

    pub async fn find_hold(&self, hold_ref: &str) -> Result<PaymentHold, AppError> {
        self.repo
            .find_hold(hold_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment hold {} not found", hold_ref)))
    }

    pub async fn authorize(
        &self,
        booking_id: &str,
        amount: i64,
        currency: &str,
        processor_customer_id: &str,
    ) -> Result<PaymentHold, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(format!("Cannot authorize {}", amount)));
        }

        let key = format!("{}:authorize", booking_id);
        if let Some(existing) = self.repo.find_hold_by_key(&key).await? {
            if existing.status == HoldStatus::Voided {
                return Err(AppError::InvalidHoldState(format!(
                    "Hold {} for booking {} was already voided",
                    existing.hold_ref, booking_id
                )));
            }
            info!(booking_id, hold_ref = %existing.hold_ref, "Authorization replayed from local record");
            return Ok(existing);
        }
        if let Some(active) = self.repo.find_active_hold_for_booking(booking_id).await? {
            return Ok(active);
        }

        let request = AuthorizeRequest {
            idempotency_key: key.clone(),
            booking_id: booking_id.to_string(),
            amount,
            currency: currency.to_string(),
            processor_customer_id: processor_customer_id.to_string(),
        };

        info!(operation = "authorize", booking_id, idempotency_key = %key, amount, currency, "Payment call starting");
        let processor_hold = self
            .call_processor(
                "authorize",
                &key,
                || self.processor.authorize(&request),
                || self.processor.find_by_idempotency_key(&key),
                false,
            )
            .await?;

        if processor_hold.amount != amount {
            warn!(
                booking_id,
                hold_ref = %processor_hold.hold_ref,
                requested = amount,
                authorized = processor_hold.amount,
                "Partial authorization returned, releasing it"
            );
            let void_key = format!("{}:void", processor_hold.hold_ref);
            if let Err(e) = self.processor.void(&processor_hold.hold_ref, &void_key).await {
                error!(hold_ref = %processor_hold.hold_ref, "Failed to release partial authorization: {}", e);
            }
            return Err(AppError::InvalidAmount(format!(
                "Processor authorized {} of the requested {}",
                processor_hold.amount, amount
            )));
        }

        let now = self.clock.now();
        let hold = self
            .repo
            .insert_hold(&PaymentHold {
                hold_ref: processor_hold.hold_ref,
                booking_id: booking_id.to_string(),
                idempotency_key: key.clone(),
                processor_customer_id: processor_customer_id.to_string(),
                currency: currency.to_string(),
                amount_authorized: amount,
                amount_captured: 0,
                amount_refunded: 0,
                status: HoldStatus::RequiresCapture,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(operation = "authorize", booking_id, hold_ref = %hold.hold_ref, amount, outcome = "authorized", "Payment call finished");
        Ok(hold)
    }

    /// Captures `amount` (default: everything authorized). Capturing twice is a no-op.
    pub async fn capture(&self, hold_ref: &str, amount: Option<i64>) -> Result<CaptureResult, AppError> {
        let mut hold = self.find_hold(hold_ref).await?;

        match hold.status {
            HoldStatus::RequiresCapture => {}
            status if status.is_captured() => {
                info!(operation = "capture", hold_ref, outcome = "already_captured", "Capture replay ignored");
                return Ok(CaptureResult {
                    hold_ref: hold.hold_ref,
                    amount_captured: hold.amount_captured,
                    already_captured: true,
                });
            }
            status => {
                return Err(AppError::InvalidHoldState(format!(
                    "Hold {} is {} and cannot be captured",
                    hold_ref,
                    status.as_str()
                )));
            }
        }

        let amount = amount.unwrap_or(hold.amount_authorized);
        if amount <= 0 || amount > hold.amount_authorized {
            return Err(AppError::InvalidAmount(format!(
                "Capture of {} outside authorized {}",
                amount, hold.amount_authorized
            )));
        }

        let key = format!("{}:capture", hold_ref);
        info!(operation = "capture", booking_id = %hold.booking_id, hold_ref, idempotency_key = %key, amount, "Payment call starting");
        let processor_hold = self
            .call_processor(
                "capture",
                &key,
                || self.processor.capture(hold_ref, amount, &key),
                || async {
                    let current = self.processor.retrieve(hold_ref).await?;
                    Ok::<_, AppError>((current.status == ProcessorHoldStatus::Succeeded).then_some(current))
                },
                false,
            )
            .await?;

        hold.amount_captured = if processor_hold.amount_captured > 0 { processor_hold.amount_captured } else { amount };
        hold.status = HoldStatus::Captured;
        hold.updated_at = self.clock.now();
        let hold = self.repo.update_hold(&hold).await?;

        info!(operation = "capture", hold_ref, amount = hold.amount_captured, outcome = "captured", "Payment call finished");
        Ok(CaptureResult {
            hold_ref: hold.hold_ref,
            amount_captured: hold.amount_captured,
            already_captured: false,
        })
    }

    /// Releases an uncaptured hold entirely, or refunds `refund_amount` of a captured one.
    pub async fn void_or_refund(&self, hold_ref: &str, refund_amount: i64) -> Result<Settlement, AppError> {
        let mut hold = self.find_hold(hold_ref).await?;

        match hold.status {
            HoldStatus::Voided => Ok(Settlement::Voided { released: hold.amount_authorized }),
            HoldStatus::RequiresCapture => {
                let key = format!("{}:void", hold_ref);
                info!(
                    operation = "void",
                    booking_id = %hold.booking_id,
                    hold_ref,
                    idempotency_key = %key,
                    amount = hold.amount_authorized,
                    "Payment call starting"
                );
                self.call_processor(
                    "void",
                    &key,
                    || self.processor.void(hold_ref, &key),
                    || async {
                        let current = self.processor.retrieve(hold_ref).await?;
                        Ok::<_, AppError>((current.status == ProcessorHoldStatus::Canceled).then_some(current))
                    },
                    false,
                )
                .await?;

                hold.status = HoldStatus::Voided;
                hold.updated_at = self.clock.now();
                let hold = self.repo.update_hold(&hold).await?;
                info!(operation = "void", hold_ref, outcome = "voided", "Payment call finished");
                Ok(Settlement::Voided { released: hold.amount_authorized })
            }
            _ => {
                if refund_amount < 0 || refund_amount > hold.refundable() {
                    return Err(AppError::InvalidAmount(format!(
                        "Refund of {} exceeds refundable {} on hold {}",
                        refund_amount,
                        hold.refundable(),
                        hold_ref
                    )));
                }
                if refund_amount == 0 {
                    return Ok(Settlement::Refunded { amount: 0 });
                }

                let refunded_before = hold.amount_refunded;
                let key = format!("{}:refund:{}:{}", hold_ref, refunded_before, refund_amount);
                info!(
                    operation = "refund",
                    booking_id = %hold.booking_id,
                    hold_ref,
                    idempotency_key = %key,
                    amount = refund_amount,
                    "Payment call starting"
                );
                self.call_processor(
                    "refund",
                    &key,
                    || self.processor.refund(hold_ref, refund_amount, &key),
                    || async {
                        let current = self.processor.retrieve(hold_ref).await?;
                        Ok::<_, AppError>((current.amount_refunded >= refunded_before + refund_amount).then(|| ProcessorRefund {
                            refund_ref: format!("{}:reconciled", key),
                            amount: refund_amount,
                        }))
                    },
                    false,
                )
                .await?;

                hold.amount_refunded += refund_amount;
                hold.status = if hold.refundable() == 0 { HoldStatus::Refunded } else { HoldStatus::PartiallyRefunded };
                hold.updated_at = self.clock.now();
                self.repo.update_hold(&hold).await?;
                info!(operation = "refund", hold_ref, amount = refund_amount, outcome = "refunded", "Payment call finished");
                Ok(Settlement::Refunded { amount: refund_amount })
            }
        }
    }

    /// Releases a hold the processor may have placed for `booking_id` without
    /// it ever being recorded here, as after an authorization that timed out.
    /// The hold is recorded before the void so a failed release is picked up
    /// by the reconciliation sweep.
    pub async fn release_unrecorded(
        &self,
        booking_id: &str,
        customer_ref: &str,
        currency: &str,
    ) -> Result<Settlement, AppError> {
        let key = format!("{}:authorize", booking_id);
        if let Some(local) = self.repo.find_hold_by_key(&key).await? {
            return self.void_or_refund(&local.hold_ref, 0).await;
        }

        let found = self
            .call_processor(
                "lookup",
                &key,
                || self.processor.find_by_idempotency_key(&key),
                || async { Ok::<Option<Option<ProcessorHold>>, AppError>(None) },
                true,
            )
            .await?;
        let Some(found) = found else {
            return Ok(Settlement::NoHold);
        };

        let status = match found.status {
            ProcessorHoldStatus::RequiresCapture => HoldStatus::RequiresCapture,
            ProcessorHoldStatus::Canceled => HoldStatus::Voided,
            ProcessorHoldStatus::Succeeded => {
                return Err(AppError::InvalidHoldState(format!(
                    "Unrecorded hold {} for booking {} was captured",
                    found.hold_ref, booking_id
                )));
            }
        };
        warn!(booking_id, hold_ref = %found.hold_ref, amount = found.amount, "Found unrecorded processor hold");

        let processor_customer_id = self
            .repo
            .find_customer(customer_ref)
            .await?
            .map(|c| c.processor_customer_id)
            .unwrap_or_default();
        let now = self.clock.now();
        let hold = self
            .repo
            .insert_hold(&PaymentHold {
                hold_ref: found.hold_ref,
                booking_id: booking_id.to_string(),
                idempotency_key: key,
                processor_customer_id,
                currency: currency.to_string(),
                amount_authorized: found.amount,
                amount_captured: 0,
                amount_refunded: 0,
                status,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.void_or_refund(&hold.hold_ref, 0).await
    }

    /// Replays void/refund for ended bookings whose money side never landed.
    /// Returns how many holds were settled.
    pub async fn reconcile_unsettled(&self, limit: i64) -> Result<usize, AppError> {
        let mut settled = 0;
        for unsettled in self.repo.find_unsettled_holds(limit).await? {
            let hold = &unsettled.hold;
            let outstanding = match hold.status {
                HoldStatus::RequiresCapture => 0,
                _ => unsettled.booking_refund_amount.unwrap_or(0) - hold.amount_refunded,
            };
            match self.void_or_refund(&hold.hold_ref, outstanding.max(0)).await {
                Ok(settlement) => {
                    info!(hold_ref = %hold.hold_ref, booking_id = %hold.booking_id, ?settlement, "Reconciled hold");
                    settled += 1;
                }
                Err(e) => warn!(hold_ref = %hold.hold_ref, "Reconciliation attempt failed: {}", e),
            }
        }
        Ok(settled)
    }

    /// Runs `call`, retrying `ProcessorUnavailable` under the same key. On a
    /// timeout it asks `reconcile` first: a found result is adopted, a confirmed
    /// absence allows another attempt, and an unanswerable query surfaces
    /// `AmbiguousOutcome`.
    async fn call_processor<T, C, CF, R, RF>(
        &self,
        operation: &'static str,
        idempotency_key: &str,
        mut call: C,
        mut reconcile: R,
        retry_ambiguous: bool,
    ) -> Result<T, AppError>
    where
        C: FnMut() -> CF,
        CF: Future<Output = Result<T, AppError>>,
        R: FnMut() -> RF,
        RF: Future<Output = Result<Option<T>, AppError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last_attempt = attempt >= max_attempts;

            match call().await {
                Ok(value) => return Ok(value),
                Err(AppError::ProcessorUnavailable(msg)) if !last_attempt => {
                    warn!(operation, idempotency_key, attempt, "Processor unavailable, retrying: {}", msg);
                }
                Err(AppError::AmbiguousOutcome(msg)) if retry_ambiguous && !last_attempt => {
                    warn!(operation, idempotency_key, attempt, "Processor timed out, retrying: {}", msg);
                }
                Err(AppError::AmbiguousOutcome(msg)) => {
                    warn!(operation, idempotency_key, attempt, "Processor outcome unknown, reconciling: {}", msg);
                    match reconcile().await {
                        Ok(Some(value)) => {
                            info!(operation, idempotency_key, outcome = "reconciled", "Processor had applied the call");
                            return Ok(value);
                        }
                        Ok(None) if !last_attempt => {
                            info!(operation, idempotency_key, "Processor confirms nothing applied, retrying");
                        }
                        Ok(None) => {
                            return Err(AppError::ProcessorUnavailable(format!(
                                "{} not applied after {} attempts: {}",
                                operation, attempt, msg
                            )));
                        }
                        Err(e) => {
                            error!(operation, idempotency_key, "Reconciliation query failed: {}", e);
                            return Err(AppError::AmbiguousOutcome(msg));
                        }
                    }
                }
                Err(e) => {
                    warn!(operation, idempotency_key, attempt, outcome = e.kind(), "Payment call failed: {}", e);
                    return Err(e);
                }
            }

            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(6));
        let jitter = if base > 1 { rand::thread_rng().gen_range(0..base / 2) } else { 0 };
        Duration::from_millis(exp + jitter)
    }
}
