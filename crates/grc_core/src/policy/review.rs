use chrono::{Duration, NaiveDate};

use super::types::ReviewStatus;

/// Review schedule classification relative to `today`.
pub fn review_status(
    next_review_at: Option<NaiveDate>,
    today: NaiveDate,
    due_soon_days: i64,
) -> ReviewStatus {
    match next_review_at {
        None => ReviewStatus::NoSchedule,
        Some(next) if next < today => ReviewStatus::Overdue,
        Some(next) if next <= today + Duration::days(due_soon_days) => ReviewStatus::DueSoon,
        Some(_) => ReviewStatus::OnTrack,
    }
}

/// `today + frequency` when the policy has a review cadence.
pub fn next_review(today: NaiveDate, review_frequency_days: Option<i32>) -> Option<NaiveDate> {
    review_frequency_days
        .and_then(|days| today.checked_add_signed(Duration::days(i64::from(days))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn classifies_review_windows() {
        let today = date(2026, 6, 1);
        assert_eq!(review_status(None, today, 30), ReviewStatus::NoSchedule);
        assert_eq!(review_status(Some(date(2026, 5, 31)), today, 30), ReviewStatus::Overdue);
        assert_eq!(review_status(Some(today), today, 30), ReviewStatus::DueSoon);
        assert_eq!(review_status(Some(date(2026, 7, 1)), today, 30), ReviewStatus::DueSoon);
        assert_eq!(review_status(Some(date(2026, 7, 2)), today, 30), ReviewStatus::OnTrack);
    }

    #[test]
    fn next_review_adds_frequency() {
        assert_eq!(next_review(date(2026, 1, 1), Some(365)), Some(date(2027, 1, 1)));
        assert_eq!(next_review(date(2026, 1, 1), None), None);
    }
}
