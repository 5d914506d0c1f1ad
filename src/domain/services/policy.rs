//! Cancellation, pricing and recurrence arithmetic. Everything here is pure:
//! time comes in as an argument and money is integer minor units.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};
use serde::Serialize;

use crate::config::PolicyConfig;
use crate::domain::models::booking::{BookingPrice, BookingStatus};
use crate::domain::models::subscription::{Frequency, RecurringSubscription, Termination};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationPolicyResult {
    pub can_cancel: bool,
    pub reason: String,
    pub refund_percentage: u8,
    pub hours_until_service: Option<f64>,
}

impl CancellationPolicyResult {
    fn blocked(reason: String, hours_until_service: Option<f64>) -> Self {
        Self { can_cancel: false, reason, refund_percentage: 0, hours_until_service }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyCalculator {
    config: PolicyConfig,
}

impl PolicyCalculator {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn calculate_cancellation_policy(
        &self,
        scheduled_start: Option<DateTime<Utc>>,
        current_status: BookingStatus,
        now: DateTime<Utc>,
    ) -> CancellationPolicyResult {
        let Some(start) = scheduled_start else {
            return CancellationPolicyResult::blocked("Booking has no schedule".into(), None);
        };

        if !matches!(
            current_status,
            BookingStatus::PendingPayment | BookingStatus::Authorized | BookingStatus::Confirmed
        ) {
            return CancellationPolicyResult::blocked(
                format!("Bookings that are {} cannot be canceled", current_status),
                None,
            );
        }

        let hours = (start - now).num_milliseconds() as f64 / 3_600_000.0;
        if hours < 0.0 {
            return CancellationPolicyResult::blocked("Service start time has already passed".into(), Some(hours));
        }

        let tier = self.config.refund_tiers.iter().find(|tier| hours >= tier.min_hours);
        let (refund_percentage, reason) = match tier {
            Some(tier) if tier.refund_percentage > 0 => (
                tier.refund_percentage,
                format!(
                    "Canceled {:.1}h before service ({}h+ notice): {}% refund",
                    hours, tier.min_hours, tier.refund_percentage
                ),
            ),
            _ => (0, format!("Canceled {:.1}h before service: no refund at this notice", hours)),
        };

        CancellationPolicyResult {
            can_cancel: true,
            reason,
            refund_percentage,
            hours_until_service: Some(hours),
        }
    }

    /// Total for a draft: fixed quotes pass through, hourly quotes are floored
    /// at the configured minimum.
    pub fn booking_amount(&self, price: &BookingPrice, duration_minutes: i32) -> Result<i64, AppError> {
        match price {
            BookingPrice::Fixed { amount } if *amount > 0 => Ok(*amount),
            BookingPrice::Fixed { amount } => Err(AppError::InvalidAmount(format!("Amount must be positive, got {}", amount))),
            BookingPrice::Hourly { rate } if *rate > 0 && duration_minutes > 0 => {
                let derived = div_round_half_up(*rate as i128 * duration_minutes as i128, 60);
                Ok(derived.max(self.config.minimum_booking_amount))
            }
            BookingPrice::Hourly { rate } => Err(AppError::InvalidAmount(format!(
                "Hourly rate {} over {} minutes does not yield a positive amount",
                rate, duration_minutes
            ))),
        }
    }

    /// Per-occurrence amount after the frequency discount, with the discount
    /// percentage applied.
    pub fn discounted_amount(&self, frequency: Frequency, base_amount: i64) -> (u8, i64) {
        let pct = self.config.discount_for(frequency);
        let discount = calculate_refund_amount(base_amount, pct);
        (pct, base_amount - discount)
    }
}

/// `round(amount * percentage / 100)`, half-up, in minor units.
pub fn calculate_refund_amount(amount_authorized: i64, refund_percentage: u8) -> i64 {
    div_round_half_up(amount_authorized as i128 * refund_percentage as i128, 100)
}

fn div_round_half_up(numerator: i128, denominator: i128) -> i64 {
    let rounded = if numerator >= 0 {
        (numerator + denominator / 2) / denominator
    } else {
        (numerator - denominator / 2) / denominator
    };
    rounded as i64
}

pub fn calculate_next_occurrence(current: NaiveDate, frequency: Frequency, day_of_week: Option<Weekday>) -> NaiveDate {
    let mut candidate = advance(current, frequency);

    let Some(weekday) = day_of_week else {
        return candidate;
    };

    let mut snapped = snap_forward(candidate, weekday);
    // Never stall or go backwards.
    while snapped <= current {
        candidate = advance(candidate, frequency);
        snapped = snap_forward(candidate, weekday);
    }
    snapped
}

fn advance(date: NaiveDate, frequency: Frequency) -> NaiveDate {
    match frequency {
        Frequency::Weekly => date + Duration::days(7),
        Frequency::Biweekly => date + Duration::days(14),
        Frequency::Monthly => date
            .checked_add_months(Months::new(1))
            .unwrap_or(date + Duration::days(31)),
    }
}

fn snap_forward(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let offset = (7 + weekday.num_days_from_monday() - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(offset as i64)
}

pub fn should_terminate_subscription(subscription: &RecurringSubscription, occurrence_date: NaiveDate) -> bool {
    match subscription.termination() {
        Termination::Occurrences { total_count } => {
            (subscription.total_occurrences_completed.max(0) as u32) + 1 >= total_count
        }
        Termination::Date { end_date } => occurrence_date > end_date,
        Termination::Never => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefundTier;
    use crate::domain::models::subscription::{SubscriptionDraft, RecurringSubscription};
    use chrono::{NaiveTime, TimeZone};

    fn calculator() -> PolicyCalculator {
        PolicyCalculator::new(PolicyConfig::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_tiers_at_boundaries() {
        let calc = calculator();
        let cases = [
            (Duration::hours(23) + Duration::minutes(59), 0),
            (Duration::hours(24), 50),
            (Duration::hours(30), 50),
            (Duration::hours(71) + Duration::minutes(59), 50),
            (Duration::hours(72), 100),
            (Duration::days(10), 100),
        ];

        for (lead, expected) in cases {
            let result = calc.calculate_cancellation_policy(Some(now() + lead), BookingStatus::Confirmed, now());
            assert!(result.can_cancel, "lead {:?} should be cancelable", lead);
            assert_eq!(result.refund_percentage, expected, "lead {:?}: {}", lead, result.reason);
        }
    }

    #[test]
    fn test_refund_is_monotonic_in_notice() {
        let calc = calculator();
        let mut previous = 0;
        for minutes in (0..=(96 * 60)).step_by(7) {
            let policy = calc.calculate_cancellation_policy(
                Some(now() + Duration::minutes(minutes)),
                BookingStatus::Authorized,
                now(),
            );
            let refund = calculate_refund_amount(100_000, policy.refund_percentage);
            assert!(refund >= previous, "refund dropped at {} minutes", minutes);
            previous = refund;
        }
    }

    #[test]
    fn test_blocked_cases() {
        let calc = calculator();

        let no_schedule = calc.calculate_cancellation_policy(None, BookingStatus::Authorized, now());
        assert!(!no_schedule.can_cancel);
        assert!(no_schedule.reason.contains("no schedule"));

        let past = calc.calculate_cancellation_policy(Some(now() - Duration::minutes(1)), BookingStatus::Confirmed, now());
        assert!(!past.can_cancel);
        assert!(past.hours_until_service.unwrap() < 0.0);

        for status in [BookingStatus::InProgress, BookingStatus::Completed, BookingStatus::Canceled, BookingStatus::Declined] {
            let result = calc.calculate_cancellation_policy(Some(now() + Duration::days(5)), status, now());
            assert!(!result.can_cancel);
            assert!(result.reason.contains(status.as_str()), "{}", result.reason);
        }
    }

    #[test]
    fn test_start_exactly_now_is_zero_refund() {
        let result = calculator().calculate_cancellation_policy(Some(now()), BookingStatus::Confirmed, now());
        assert!(result.can_cancel);
        assert_eq!(result.refund_percentage, 0);
    }

    #[test]
    fn test_injected_tiers_replace_defaults() {
        let calc = PolicyCalculator::new(PolicyConfig {
            refund_tiers: vec![
                RefundTier { min_hours: 48.0, refund_percentage: 80 },
                RefundTier { min_hours: 0.0, refund_percentage: 10 },
            ],
            ..PolicyConfig::default()
        });
        let result = calc.calculate_cancellation_policy(Some(now() + Duration::hours(30)), BookingStatus::Confirmed, now());
        assert_eq!(result.refund_percentage, 10);
    }

    #[test]
    fn test_refund_rounds_half_up() {
        assert_eq!(calculate_refund_amount(100_000, 50), 50_000);
        assert_eq!(calculate_refund_amount(333, 50), 167);
        assert_eq!(calculate_refund_amount(1, 50), 1);
        assert_eq!(calculate_refund_amount(1, 49), 0);
        assert_eq!(calculate_refund_amount(12_345, 0), 0);
        assert_eq!(calculate_refund_amount(12_345, 100), 12_345);
    }

    #[test]
    fn test_booking_amount() {
        let calc = calculator();
        assert_eq!(calc.booking_amount(&BookingPrice::Fixed { amount: 9000 }, 60).unwrap(), 9000);
        assert_eq!(calc.booking_amount(&BookingPrice::Hourly { rate: 4000 }, 90).unwrap(), 6000);
        // 1000/h for 30 minutes is 500, under the 2500 floor.
        assert_eq!(calc.booking_amount(&BookingPrice::Hourly { rate: 1000 }, 30).unwrap(), 2500);
        assert!(matches!(calc.booking_amount(&BookingPrice::Fixed { amount: 0 }, 60), Err(AppError::InvalidAmount(_))));
        assert!(matches!(calc.booking_amount(&BookingPrice::Hourly { rate: 4000 }, 0), Err(AppError::InvalidAmount(_))));
    }

    #[test]
    fn test_discounted_amount() {
        let (pct, amount) = calculator().discounted_amount(Frequency::Weekly, 8000);
        assert_eq!(pct, 15);
        assert_eq!(amount, 6800);
    }

    #[test]
    fn test_next_occurrence_plain_periods() {
        let thu = date(2026, 3, 5);
        assert_eq!(calculate_next_occurrence(thu, Frequency::Weekly, None), date(2026, 3, 12));
        assert_eq!(calculate_next_occurrence(thu, Frequency::Biweekly, None), date(2026, 3, 19));
        assert_eq!(calculate_next_occurrence(thu, Frequency::Monthly, None), date(2026, 4, 5));
        assert_eq!(calculate_next_occurrence(date(2026, 1, 31), Frequency::Monthly, None), date(2026, 2, 28));
    }

    #[test]
    fn test_next_occurrence_snaps_to_weekday() {
        let thu = date(2026, 3, 5);
        assert_eq!(calculate_next_occurrence(thu, Frequency::Weekly, Some(Weekday::Mon)), date(2026, 3, 16));
        assert_eq!(calculate_next_occurrence(thu, Frequency::Weekly, Some(Weekday::Thu)), date(2026, 3, 12));
        // 2026-04-05 is a Sunday; next Tuesday after it.
        assert_eq!(calculate_next_occurrence(thu, Frequency::Monthly, Some(Weekday::Tue)), date(2026, 4, 7));
    }

    #[test]
    fn test_next_occurrence_strictly_increases() {
        let mut current = date(2026, 1, 1);
        for _ in 0..100 {
            let next = calculate_next_occurrence(current, Frequency::Monthly, Some(Weekday::Fri));
            assert!(next > current);
            assert_eq!(next.weekday(), Weekday::Fri);
            current = next;
        }
    }

    fn subscription(termination: Termination, completed: i32) -> RecurringSubscription {
        let draft = SubscriptionDraft {
            customer_ref: "c".into(),
            professional_ref: "p".into(),
            frequency: Frequency::Weekly,
            day_of_week: None,
            preferred_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            first_date: date(2026, 3, 5),
            timezone: "UTC".into(),
            service_name: "Clean".into(),
            hourly_rate: 4000,
            duration_minutes: 60,
            address: None,
            instructions: None,
            currency: "USD".into(),
            termination,
        };
        let mut sub = RecurringSubscription::new(&draft, 0, 4000, now());
        sub.total_occurrences_completed = completed;
        sub
    }

    #[test]
    fn test_should_terminate() {
        let four = Termination::Occurrences { total_count: 4 };
        assert!(!should_terminate_subscription(&subscription(four, 2), date(2026, 4, 1)));
        assert!(should_terminate_subscription(&subscription(four, 3), date(2026, 4, 1)));

        let until = Termination::Date { end_date: date(2026, 4, 1) };
        assert!(!should_terminate_subscription(&subscription(until, 0), date(2026, 4, 1)));
        assert!(should_terminate_subscription(&subscription(until, 0), date(2026, 4, 2)));

        assert!(!should_terminate_subscription(&subscription(Termination::Never, 500), date(2030, 1, 1)));
    }
}
