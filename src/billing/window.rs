//! Billing window arithmetic
//!
//! Monthly windows are anchored at the owner's account-creation day of
//! month. All arithmetic is UTC; window instants sit at 00:00:00 of the
//! (clamped) anchor day.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// A resolved billing window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `YYYYMMDD` of the window start, used in counter keys
    pub period_key: String,
}

/// Compute the billing window containing `now` for an owner created at
/// `user_created_at`.
///
/// Let `d` be the creation day of month. The window starts on day `d` of
/// the current month (clamped to the last day when the month is shorter),
/// rolled back one month when that instant lies in the future, and ends
/// one month later under the same clamping rule. Total and deterministic
/// for every `user_created_at <= now`.
pub fn billing_window(user_created_at: DateTime<Utc>, now: DateTime<Utc>) -> BillingWindow {
    let anchor_day = user_created_at.day();

    let mut year = now.year();
    let mut month = now.month();
    let mut start = anchored_date(year, month, anchor_day);
    if start > now {
        (year, month) = previous_month(year, month);
        start = anchored_date(year, month, anchor_day);
    }

    let (end_year, end_month) = next_month(year, month);
    let end = anchored_date(end_year, end_month, anchor_day);

    BillingWindow {
        start,
        end,
        period_key: start.format("%Y%m%d").to_string(),
    }
}

fn anchored_date(year: i32, month: u32, anchor_day: u32) -> DateTime<Utc> {
    let day = anchor_day.min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .expect("clamped day is always valid")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");
    Utc.from_utc_datetime(&date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = next_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is always valid")
        .pred_opt()
        .expect("date has a predecessor")
        .day()
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn window_contains_now_and_anchors_on_creation_day() {
        let created = utc(2023, 3, 15, 9);
        let now = utc(2024, 6, 20, 12);
        let w = billing_window(created, now);

        assert_eq!(w.start, utc(2024, 6, 15, 0));
        assert_eq!(w.end, utc(2024, 7, 15, 0));
        assert_eq!(w.period_key, "20240615");
        assert!(w.start <= now && now < w.end);
    }

    #[test]
    fn rolls_back_when_anchor_day_is_in_the_future() {
        let created = utc(2023, 3, 20, 9);
        let now = utc(2024, 6, 10, 12);
        let w = billing_window(created, now);

        assert_eq!(w.start, utc(2024, 5, 20, 0));
        assert_eq!(w.end, utc(2024, 6, 20, 0));
    }

    #[test]
    fn clamps_to_end_of_short_months() {
        let created = utc(2023, 1, 31, 9);

        // February clamps the anchor to the 28th (or 29th), March restores it.
        let w = billing_window(created, utc(2023, 2, 28, 12));
        assert_eq!(w.start, utc(2023, 2, 28, 0));
        assert_eq!(w.end, utc(2023, 3, 31, 0));

        let leap = billing_window(created, utc(2024, 2, 29, 12));
        assert_eq!(leap.start, utc(2024, 2, 29, 0));
        assert_eq!(leap.period_key, "20240229");
    }

    #[test]
    fn anchor_day_equal_to_today_starts_today() {
        let created = utc(2023, 3, 15, 9);
        let now = utc(2024, 6, 15, 0);
        let w = billing_window(created, now);
        assert_eq!(w.start, utc(2024, 6, 15, 0));
        assert!(w.start <= now);
    }

    #[test]
    fn year_boundary_rolls_into_december() {
        let created = utc(2022, 12, 25, 9);
        let now = utc(2024, 1, 10, 12);
        let w = billing_window(created, now);
        assert_eq!(w.start, utc(2023, 12, 25, 0));
        assert_eq!(w.end, utc(2024, 1, 25, 0));
        assert_eq!(w.period_key, "20231225");
    }

    #[test]
    fn window_spans_exactly_one_anchored_month() {
        // Sweep a year of `now` values for a day-1 anchor and a day-31 anchor.
        for anchor in [utc(2023, 1, 1, 0), utc(2023, 1, 31, 0)] {
            for month in 1..=12u32 {
                let now = utc(2024, month, 10, 6);
                let w = billing_window(anchor, now);
                assert!(w.start <= now && now < w.end, "month {month}");
                assert_eq!(w.period_key, w.start.format("%Y%m%d").to_string());
            }
        }
    }
}
