use std::env;
use std::time::Duration;

use crate::domain::models::subscription::Frequency;
use crate::error::AppError;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub payment_api_url: String,
    pub payment_api_key: String,
    pub notification_webhook_url: String,
    pub notification_webhook_token: String,
    pub jwt_secret: String,
    pub auth_issuer: String,
    pub policy: PolicyConfig,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = PolicyConfig::default();
        let policy = PolicyConfig {
            refund_tiers: match env::var("REFUND_TIERS") {
                Ok(raw) => parse_refund_tiers(&raw)?,
                Err(_) => defaults.refund_tiers,
            },
            minimum_booking_amount: env_parse("MINIMUM_BOOKING_AMOUNT", defaults.minimum_booking_amount)?,
            weekly_discount: env_parse("DISCOUNT_WEEKLY", defaults.weekly_discount)?,
            biweekly_discount: env_parse("DISCOUNT_BIWEEKLY", defaults.biweekly_discount)?,
            monthly_discount: env_parse("DISCOUNT_MONTHLY", defaults.monthly_discount)?,
        };
        policy.validate()?;

        let retry = RetryPolicy {
            max_attempts: env_parse("PAYMENT_MAX_ATTEMPTS", RetryPolicy::default().max_attempts)?,
            base_delay: Duration::from_millis(env_parse("PAYMENT_RETRY_BASE_MS", 200u64)?),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Validation("DATABASE_URL must be set".into()))?,
            port: env_parse("PORT", 3000u16)?,
            payment_api_url: env::var("PAYMENT_API_URL").unwrap_or_else(|_| "http://localhost:12111/v1".to_string()),
            payment_api_key: env::var("PAYMENT_API_KEY").unwrap_or_else(|_| "sk_test_local".to_string()),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/v1/notify".to_string()),
            notification_webhook_token: env::var("NOTIFICATION_WEBHOOK_TOKEN").unwrap_or_else(|_| "test-token-1".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| AppError::Validation("JWT_SECRET must be set".into()))?,
            auth_issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "https://api.booking-engine.local".to_string()),
            policy,
            retry,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Validation(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// One row of the cancellation table: at least `min_hours` before the start
/// earns `refund_percentage`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefundTier {
    pub min_hours: f64,
    pub refund_percentage: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Sorted by `min_hours`, highest first.
    pub refund_tiers: Vec<RefundTier>,
    /// Floor for amounts derived from an hourly rate, in minor units.
    pub minimum_booking_amount: i64,
    pub weekly_discount: u8,
    pub biweekly_discount: u8,
    pub monthly_discount: u8,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            refund_tiers: vec![
                RefundTier { min_hours: 72.0, refund_percentage: 100 },
                RefundTier { min_hours: 24.0, refund_percentage: 50 },
                RefundTier { min_hours: 0.0, refund_percentage: 0 },
            ],
            minimum_booking_amount: 2500,
            weekly_discount: 15,
            biweekly_discount: 10,
            monthly_discount: 5,
        }
    }
}

impl PolicyConfig {
    pub fn discount_for(&self, frequency: Frequency) -> u8 {
        match frequency {
            Frequency::Weekly => self.weekly_discount,
            Frequency::Biweekly => self.biweekly_discount,
            Frequency::Monthly => self.monthly_discount,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.refund_tiers.is_empty() {
            return Err(AppError::Validation("At least one refund tier is required".into()));
        }
        if self.refund_tiers.windows(2).any(|w| w[0].min_hours <= w[1].min_hours) {
            return Err(AppError::Validation("Refund tiers must be strictly descending by hours".into()));
        }
        if self.refund_tiers.iter().any(|t| t.refund_percentage > 100 || t.min_hours < 0.0) {
            return Err(AppError::Validation("Refund tiers need 0..=100 percent and non-negative hours".into()));
        }
        if self.minimum_booking_amount <= 0 {
            return Err(AppError::Validation("MINIMUM_BOOKING_AMOUNT must be positive".into()));
        }
        if [self.weekly_discount, self.biweekly_discount, self.monthly_discount].iter().any(|d| *d > 100) {
            return Err(AppError::Validation("Discounts must be 0..=100 percent".into()));
        }
        Ok(())
    }
}

/// Parses `"72:100,24:50,0:0"` into tiers sorted highest threshold first.
pub fn parse_refund_tiers(raw: &str) -> Result<Vec<RefundTier>, AppError> {
    let mut tiers = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (hours, pct) = part
                .split_once(':')
                .ok_or_else(|| AppError::Validation(format!("Refund tier '{}' must be HOURS:PERCENT", part)))?;
            let min_hours = hours
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::Validation(format!("Invalid tier hours '{}'", hours)))?;
            let refund_percentage = pct
                .trim()
                .parse::<u8>()
                .map_err(|_| AppError::Validation(format!("Invalid tier percentage '{}'", pct)))?;
            Ok(RefundTier { min_hours, refund_percentage })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    tiers.sort_by(|a, b| b.min_hours.total_cmp(&a.min_hours));
    Ok(tiers)
}

/// Retry budget for transient processor failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refund_tiers_sorts_descending() {
        let tiers = parse_refund_tiers("0:0, 72:100 ,24:50").unwrap();
        assert_eq!(tiers, PolicyConfig::default().refund_tiers);
    }

    #[test]
    fn test_parse_refund_tiers_rejects_garbage() {
        assert!(parse_refund_tiers("72-100").is_err());
        assert!(parse_refund_tiers("72:abc").is_err());
        assert!(parse_refund_tiers("72:300").is_err());
    }

    #[test]
    fn test_policy_validation() {
        assert!(PolicyConfig::default().validate().is_ok());

        let duplicate = PolicyConfig {
            refund_tiers: vec![
                RefundTier { min_hours: 24.0, refund_percentage: 50 },
                RefundTier { min_hours: 24.0, refund_percentage: 0 },
            ],
            ..PolicyConfig::default()
        };
        assert!(duplicate.validate().is_err());

        let zero_minimum = PolicyConfig { minimum_booking_amount: 0, ..PolicyConfig::default() };
        assert!(zero_minimum.validate().is_err());
    }
}
