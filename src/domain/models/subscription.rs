use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use sqlx::FromRow;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(UnknownVariant(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    /// Ended by the owner.
    Cancelled,
    /// Ended naturally: the termination condition was reached.
    Completed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled | SubscriptionStatus::Completed)
    }
}

impl TryFrom<String> for SubscriptionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "completed" => Ok(SubscriptionStatus::Completed),
            _ => Err(UnknownVariant(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndType {
    Occurrences,
    Date,
    Never,
}

impl EndType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndType::Occurrences => "occurrences",
            EndType::Date => "date",
            EndType::Never => "never",
        }
    }
}

impl TryFrom<String> for EndType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "occurrences" => Ok(EndType::Occurrences),
            "date" => Ok(EndType::Date),
            "never" => Ok(EndType::Never),
            _ => Err(UnknownVariant(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Termination {
    Occurrences { total_count: u32 },
    Date { end_date: NaiveDate },
    Never,
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct RecurringSubscription {
    pub id: String,
    pub customer_ref: String,
    pub professional_ref: String,
    #[sqlx(try_from = "String")]
    pub frequency: Frequency,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: Option<i32>,
    pub preferred_time: NaiveTime,
    pub timezone: String,
    pub service_name: String,
    pub hourly_rate: i64,
    pub duration_minutes: i32,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub currency: String,
    pub discount_percentage: i32,
    pub discounted_amount: i64,
    #[sqlx(try_from = "String")]
    pub end_type: EndType,
    pub total_count: Option<i32>,
    pub end_date: Option<NaiveDate>,
    pub next_booking_date: NaiveDate,
    pub total_occurrences_completed: i32,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringSubscription {
    pub fn new(draft: &SubscriptionDraft, discount_percentage: i32, discounted_amount: i64, now: DateTime<Utc>) -> Self {
        let (end_type, total_count, end_date) = match draft.termination {
            Termination::Occurrences { total_count } => (EndType::Occurrences, Some(total_count as i32), None),
            Termination::Date { end_date } => (EndType::Date, None, Some(end_date)),
            Termination::Never => (EndType::Never, None, None),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            customer_ref: draft.customer_ref.clone(),
            professional_ref: draft.professional_ref.clone(),
            frequency: draft.frequency,
            day_of_week: draft.day_of_week.map(|d| d.num_days_from_monday() as i32),
            preferred_time: draft.preferred_time,
            timezone: draft.timezone.clone(),
            service_name: draft.service_name.clone(),
            hourly_rate: draft.hourly_rate,
            duration_minutes: draft.duration_minutes,
            address: draft.address.clone(),
            instructions: draft.instructions.clone(),
            currency: draft.currency.to_uppercase(),
            discount_percentage,
            discounted_amount,
            end_type,
            total_count,
            end_date,
            next_booking_date: draft.first_date,
            total_occurrences_completed: 0,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn termination(&self) -> Termination {
        match (self.end_type, self.total_count, self.end_date) {
            (EndType::Occurrences, Some(count), _) => Termination::Occurrences { total_count: count.max(0) as u32 },
            (EndType::Date, _, Some(end_date)) => Termination::Date { end_date },
            _ => Termination::Never,
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        self.day_of_week
            .and_then(|d| u8::try_from(d).ok())
            .and_then(|d| Weekday::try_from(d).ok())
    }

    /// UTC instant of the preferred local time on `date`. `None` when the local
    /// time does not exist (DST gap).
    pub fn occurrence_start(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let tz: Tz = self.timezone.parse().unwrap_or(chrono_tz::UTC);
        tz.from_local_datetime(&date.and_time(self.preferred_time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDraft {
    pub customer_ref: String,
    pub professional_ref: String,
    pub frequency: Frequency,
    pub day_of_week: Option<Weekday>,
    pub preferred_time: NaiveTime,
    pub first_date: NaiveDate,
    pub timezone: String,
    pub service_name: String,
    pub hourly_rate: i64,
    pub duration_minutes: i32,
    pub address: Option<String>,
    pub instructions: Option<String>,
    pub currency: String,
    pub termination: Termination,
}

/// Row proving a completed booking already produced its successor.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct GenerationRecord {
    pub subscription_id: String,
    pub source_booking_id: String,
    pub generated_booking_id: String,
    pub created_at: DateTime<Utc>,
}
