//! Expiry derivation and freshness classification.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::config::{MAX_FRESHNESS_DAYS, MIN_FRESHNESS_DAYS};
use crate::error::{GrcError, Result};

use super::types::FreshnessStatus;

/// `collection_date + days`, at midnight UTC.
pub fn expires_at(collection_date: NaiveDate, freshness_days: Option<i32>) -> Option<DateTime<Utc>> {
    let days = freshness_days?;
    let date = collection_date.checked_add_signed(Duration::days(i64::from(days)))?;
    Some(date.and_time(NaiveTime::MIN).and_utc())
}

/// Expired strictly before `now`; expiring soon up to and including
/// `now + soon_days`; fresh otherwise, including when there is no expiry.
pub fn classify(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    soon_days: i64,
) -> FreshnessStatus {
    match expires_at {
        None => FreshnessStatus::Fresh,
        Some(at) if at < now => FreshnessStatus::Expired,
        Some(at) if at <= now + Duration::days(soon_days) => FreshnessStatus::ExpiringSoon,
        Some(_) => FreshnessStatus::Fresh,
    }
}

pub fn validate_freshness_days(days: Option<i32>) -> Result<Option<i32>> {
    match days {
        Some(d) if !(MIN_FRESHNESS_DAYS..=MAX_FRESHNESS_DAYS).contains(&d) => {
            Err(GrcError::validation(format!(
                "freshness_period_days must be between {MIN_FRESHNESS_DAYS} and {MAX_FRESHNESS_DAYS}"
            )))
        }
        other => Ok(other),
    }
}

pub fn validate_collection_date(date: NaiveDate, today: NaiveDate) -> Result<NaiveDate> {
    if date > today {
        return Err(GrcError::validation("collection_date cannot be in the future"));
    }
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn expiry_is_midnight_after_period() {
        let at = expires_at(date(2026, 1, 31), Some(30)).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
        assert_eq!(expires_at(date(2026, 1, 31), None), None);
    }

    #[test]
    fn classification_windows() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(classify(None, now, 30), FreshnessStatus::Fresh);
        assert_eq!(
            classify(Some(now - Duration::seconds(1)), now, 30),
            FreshnessStatus::Expired
        );
        assert_eq!(
            classify(Some(now + Duration::days(30)), now, 30),
            FreshnessStatus::ExpiringSoon
        );
        assert_eq!(
            classify(Some(now + Duration::days(30) + Duration::seconds(1)), now, 30),
            FreshnessStatus::Fresh
        );
    }

    #[test]
    fn freshness_bounds() {
        assert!(validate_freshness_days(Some(1)).is_ok());
        assert!(validate_freshness_days(Some(3650)).is_ok());
        assert!(validate_freshness_days(Some(0)).is_err());
        assert!(validate_freshness_days(Some(3651)).is_err());
        assert_eq!(validate_freshness_days(None).unwrap(), None);
    }

    #[test]
    fn collection_date_not_in_future() {
        let today = date(2026, 6, 1);
        assert!(validate_collection_date(today, today).is_ok());
        assert!(validate_collection_date(date(2026, 6, 2), today).is_err());
    }
}
