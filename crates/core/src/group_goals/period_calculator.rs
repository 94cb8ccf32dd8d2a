//! Period boundary arithmetic.
//!
//! All boundaries are 00:00 UTC. Weekly periods start on Monday and last seven
//! days; monthly periods run from the 1st of a month to the 1st of the next.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use super::group_goals_model::{PeriodBounds, PeriodType};

/// Returns the aligned period containing `reference`.
pub fn bounds_for(period_type: PeriodType, reference: DateTime<Utc>) -> PeriodBounds {
    let date = reference.date_naive();
    let (start, end) = match period_type {
        PeriodType::Weekly => {
            let start = week_start(date);
            (start, start + Duration::days(7))
        }
        PeriodType::Monthly => {
            let start = month_start(date);
            (start, next_month_start(start))
        }
    };
    PeriodBounds {
        start: at_midnight(start),
        end: at_midnight(end),
    }
}

/// Returns the current period containing `reference` and the one after it.
pub fn current_and_next(
    period_type: PeriodType,
    reference: DateTime<Utc>,
) -> (PeriodBounds, PeriodBounds) {
    let current = bounds_for(period_type, reference);
    let next = next_after(period_type, current.end);
    (current, next)
}

/// Returns the period that follows one ending at `previous_end`.
///
/// The successor always starts exactly at `previous_end`, so consecutive periods
/// are contiguous even if `previous_end` were off the aligned grid.
pub fn next_after(period_type: PeriodType, previous_end: DateTime<Utc>) -> PeriodBounds {
    PeriodBounds {
        start: previous_end,
        end: bounds_for(period_type, previous_end).end,
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn next_month_start(first_of_month: NaiveDate) -> NaiveDate {
    // 32 days past the 1st always lands in the following month.
    month_start(first_of_month + Duration::days(32))
}

fn at_midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn weekly_bounds_start_on_monday_midnight() {
        // Wednesday
        let bounds = bounds_for(PeriodType::Weekly, utc(2025, 8, 6, 15, 30));
        assert_eq!(bounds.start, utc(2025, 8, 4, 0, 0));
        assert_eq!(bounds.end, utc(2025, 8, 11, 0, 0));
        assert_eq!(bounds.start.weekday(), Weekday::Mon);
        assert_eq!(bounds.duration(), Duration::days(7));
    }

    #[test]
    fn weekly_bounds_on_boundary_instant_belong_to_new_week() {
        let monday = utc(2025, 8, 11, 0, 0);
        let bounds = bounds_for(PeriodType::Weekly, monday);
        assert_eq!(bounds.start, monday);

        let sunday_late = utc(2025, 8, 10, 23, 59);
        let previous = bounds_for(PeriodType::Weekly, sunday_late);
        assert_eq!(previous.end, monday);
        assert!(!previous.contains(monday));
    }

    #[test]
    fn monthly_bounds_cover_calendar_month() {
        let bounds = bounds_for(PeriodType::Monthly, utc(2024, 2, 17, 8, 0));
        assert_eq!(bounds.start, utc(2024, 2, 1, 0, 0));
        assert_eq!(bounds.end, utc(2024, 3, 1, 0, 0));
        assert_eq!(bounds.duration(), Duration::days(29));
    }

    #[test]
    fn monthly_bounds_roll_over_year_end() {
        let bounds = bounds_for(PeriodType::Monthly, utc(2025, 12, 31, 23, 0));
        assert_eq!(bounds.start, utc(2025, 12, 1, 0, 0));
        assert_eq!(bounds.end, utc(2026, 1, 1, 0, 0));
    }

    #[test]
    fn next_period_is_contiguous() {
        for period_type in [PeriodType::Weekly, PeriodType::Monthly] {
            let mut bounds = bounds_for(period_type, utc(2025, 1, 15, 12, 0));
            for _ in 0..60 {
                let next = next_after(period_type, bounds.end);
                assert_eq!(next.start, bounds.end);
                assert!(next.end > next.start);
                assert_eq!(next, bounds_for(period_type, next.start));
                bounds = next;
            }
        }
    }

    #[test]
    fn next_after_unaligned_end_still_starts_at_previous_end() {
        let odd_end = utc(2025, 8, 6, 13, 0);
        let next = next_after(PeriodType::Weekly, odd_end);
        assert_eq!(next.start, odd_end);
        assert_eq!(next.end, utc(2025, 8, 11, 0, 0));
    }

    #[test]
    fn current_and_next_are_adjacent() {
        let (current, next) = current_and_next(PeriodType::Monthly, utc(2025, 1, 31, 10, 0));
        assert_eq!(current.end, next.start);
        assert_eq!(next.end, utc(2025, 3, 1, 0, 0));
    }

    #[test]
    fn same_input_gives_same_interval() {
        let reference = utc(2025, 5, 5, 5, 5);
        assert_eq!(
            bounds_for(PeriodType::Weekly, reference),
            bounds_for(PeriodType::Weekly, reference)
        );
    }
}
