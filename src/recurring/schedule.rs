//! Monthly schedule for recurring transactions.
//!
//! A recurring transaction happens once per calendar month on a target day of
//! the month. Months that are too short for the target day use their last day
//! instead, e.g. a target day of 31 gives Jan 31, Feb 29 (in a leap year),
//! Mar 31, Apr 30, May 31.
//!
//! Everything in this module is pure date arithmetic.

use std::{fmt::Display, iter::FusedIterator};

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, UtcOffset};

use crate::Error;

/// The day of the month a recurring transaction happens on, from 1 to 31.
///
/// The day is not checked against the length of any particular month, so that
/// the same day can be used for every month. See [clamp_to_month].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct DayOfMonth(u8);

impl DayOfMonth {
    /// The first day of any month.
    pub const FIRST: DayOfMonth = DayOfMonth(1);
    /// The last day of the longest months.
    pub const LAST: DayOfMonth = DayOfMonth(31);

    /// Create a day of the month.
    ///
    /// # Errors
    ///
    /// This function will return an [Error::InvalidDayOfMonth] if `day` is not from 1 to 31.
    pub fn new(day: i64) -> Result<Self, Error> {
        match u8::try_from(day) {
            Ok(day) if (Self::FIRST.0..=Self::LAST.0).contains(&day) => Ok(Self(day)),
            _ => Err(Error::InvalidDayOfMonth(day)),
        }
    }

    /// Create a day of the month, clamping `day` to the range 1 to 31.
    ///
    /// For reading values that should already be valid, e.g. from the database.
    pub fn clamped(day: i64) -> Self {
        match Self::new(day) {
            Ok(day) => day,
            Err(_) => {
                tracing::warn!("day of month {day} is out of range, clamping to 1..=31");
                Self(day.clamp(Self::FIRST.0.into(), Self::LAST.0.into()) as u8)
            }
        }
    }

    /// The day as a number.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for DayOfMonth {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        DayOfMonth::new(value)
    }
}

impl From<DayOfMonth> for u8 {
    fn from(value: DayOfMonth) -> Self {
        value.0
    }
}

impl Display for DayOfMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The number of days in `month` of `year`.
pub fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February if time::util::is_leap_year(year) => 29,
        Month::February => 28,
    }
}

/// The date for `day` in `month` of `year`, or the last day of the month if
/// the month is shorter than `day`.
///
/// Returns `None` only if `year` is outside the range supported by [Date].
pub fn clamp_to_month(year: i32, month: Month, day: DayOfMonth) -> Option<Date> {
    let day = day.get().min(days_in_month(year, month));

    Date::from_calendar_date(year, month, day).ok()
}

/// The start of `date` as an instant in the timezone `offset`.
pub fn local_midnight(date: Date, offset: UtcOffset) -> OffsetDateTime {
    date.midnight().assume_offset(offset)
}

/// The first date for `day` that is strictly after `anchor`.
///
/// The candidate in the anchor's own month is used if it starts after the
/// anchor, otherwise the candidate in the following month. Dates are compared
/// by their midnight in the anchor's timezone, so a candidate on the same date
/// as the anchor is never after it unless the anchor is exactly at midnight
/// of an earlier date.
///
/// Returns `None` only at the end of the range supported by [Date].
pub fn first_candidate(anchor: OffsetDateTime, day: DayOfMonth) -> Option<Date> {
    let candidate = clamp_to_month(anchor.year(), anchor.month(), day)?;

    if local_midnight(candidate, anchor.offset()) > anchor {
        Some(candidate)
    } else {
        next_tick(candidate, day)
    }
}

/// The first date for `day` that is strictly after the calendar date `previous`.
///
/// Unlike [first_candidate] this needs no timezone, which makes it the right
/// choice for resuming from a stored checkpoint date.
///
/// Returns `None` only at the end of the range supported by [Date].
pub fn first_candidate_after_date(previous: Date, day: DayOfMonth) -> Option<Date> {
    let candidate = clamp_to_month(previous.year(), previous.month(), day)?;

    if candidate > previous {
        Some(candidate)
    } else {
        next_tick(candidate, day)
    }
}

/// The date for `day` in the calendar month immediately after `previous`.
///
/// The month is always exactly one month after `previous`'s month. The day is
/// `day` if that month is long enough, otherwise the last day of that month.
/// The day of `previous` is ignored, so a day that was clamped in a short month
/// (e.g. Feb 28) goes back up to `day` in the next long enough month (Mar 31).
///
/// Returns `None` only at the end of the range supported by [Date].
pub fn next_tick(previous: Date, day: DayOfMonth) -> Option<Date> {
    let (year, month) = match previous.month() {
        Month::December => (previous.year().checked_add(1)?, Month::January),
        month => (previous.year(), month.next()),
    };

    clamp_to_month(year, month, day)
}

/// A lazy sequence of dates for a recurring transaction, one per calendar month.
///
/// The sequence starts at [first_candidate] and advances with [next_tick].
/// It does not end on its own, callers should stop pulling dates once they
/// reach the present, e.g. with [Iterator::take_while].
///
/// Clone the schedule to restart it from the same position.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySchedule {
    next: Option<Date>,
    day: DayOfMonth,
}

impl MonthlySchedule {
    /// Create the schedule of dates for `day` strictly after `anchor`.
    pub fn after(anchor: OffsetDateTime, day: DayOfMonth) -> Self {
        Self {
            next: first_candidate(anchor, day),
            day,
        }
    }

    /// Create the schedule of dates for `day` strictly after the date `previous`.
    pub fn after_date(previous: Date, day: DayOfMonth) -> Self {
        Self {
            next: first_candidate_after_date(previous, day),
            day,
        }
    }
}

impl Iterator for MonthlySchedule {
    type Item = Date;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = next_tick(current, self.day);

        Some(current)
    }
}

impl FusedIterator for MonthlySchedule {}


#[cfg(test)]
mod schedule_tests {
    use time::{
        Month,
        macros::{date, datetime},
    };

    use crate::recurring::{
        DayOfMonth, MonthlySchedule, first_candidate, next_tick,
        schedule::{clamp_to_month, days_in_month, first_candidate_after_date},
    };

    fn day(day: i64) -> DayOfMonth {
        DayOfMonth::new(day).unwrap()
    }

    #[test]
    fn days_in_february_depends_on_leap_year() {
        assert_eq!(days_in_month(2023, Month::February), 28);
        assert_eq!(days_in_month(2024, Month::February), 29);
        assert_eq!(days_in_month(1900, Month::February), 28);
        assert_eq!(days_in_month(2000, Month::February), 29);
    }

    #[test]
    fn clamp_uses_last_day_of_short_months() {
        assert_eq!(
            clamp_to_month(2023, Month::February, day(31)),
            Some(date!(2023 - 02 - 28))
        );
        assert_eq!(
            clamp_to_month(2024, Month::April, day(31)),
            Some(date!(2024 - 04 - 30))
        );
        assert_eq!(
            clamp_to_month(2024, Month::April, day(15)),
            Some(date!(2024 - 04 - 15))
        );
    }

    #[test]
    fn first_candidate_in_anchor_month_when_after_anchor() {
        let got = first_candidate(datetime!(2024-01-01 00:00 UTC), day(15));

        assert_eq!(got, Some(date!(2024 - 01 - 15)));
    }

    #[test]
    fn first_candidate_skips_to_next_month_when_not_after_anchor() {
        let got = first_candidate(datetime!(2024-01-20 09:30 UTC), day(15));

        assert_eq!(got, Some(date!(2024 - 02 - 15)));
    }

    #[test]
    fn first_candidate_on_anchor_date_is_not_after_anchor() {
        assert_eq!(
            first_candidate(datetime!(2024-01-31 00:00 UTC), day(31)),
            Some(date!(2024 - 02 - 29))
        );
        assert_eq!(
            first_candidate(datetime!(2024-01-31 18:00 UTC), day(31)),
            Some(date!(2024 - 02 - 29))
        );
    }

    #[test]
    fn first_candidate_clamps_in_anchor_month() {
        let got = first_candidate(datetime!(2023-02-10 12:00 UTC), day(30));

        assert_eq!(got, Some(date!(2023 - 02 - 28)));
    }

    #[test]
    fn first_candidate_uses_anchor_offset() {
        // 2024-03-14 23:00 in UTC is already 2024-03-15 in Auckland (UTC+13).
        let anchor = datetime!(2024-03-15 12:00 +13);

        assert_eq!(first_candidate(anchor, day(15)), Some(date!(2024 - 04 - 15)));
    }

    #[test]
    fn first_candidate_after_date_skips_the_date_itself() {
        assert_eq!(
            first_candidate_after_date(date!(2024 - 03 - 15), day(15)),
            Some(date!(2024 - 04 - 15))
        );
        assert_eq!(
            first_candidate_after_date(date!(2024 - 02 - 29), day(31)),
            Some(date!(2024 - 03 - 31))
        );
    }

    #[test]
    fn first_candidate_after_date_uses_later_day_in_same_month() {
        assert_eq!(
            first_candidate_after_date(date!(2024 - 03 - 15), day(20)),
            Some(date!(2024 - 03 - 20))
        );
        assert_eq!(
            first_candidate_after_date(date!(2024 - 03 - 15), day(10)),
            Some(date!(2024 - 04 - 10))
        );
    }

    #[test]
    fn schedule_after_date_continues_from_checkpoint() {
        let dates = MonthlySchedule::after_date(date!(2024 - 11 - 30), day(31))
            .take(3)
            .collect::<Vec<_>>();

        assert_eq!(
            dates,
            [date!(2024 - 12 - 31), date!(2025 - 01 - 31), date!(2025 - 02 - 28)]
        );
    }

    #[test]
    fn next_tick_rolls_over_year() {
        assert_eq!(
            next_tick(date!(2024 - 12 - 31), day(31)),
            Some(date!(2025 - 01 - 31))
        );
    }

    #[test]
    fn next_tick_from_jan_31_does_not_skip_february() {
        assert_eq!(
            next_tick(date!(2023 - 01 - 31), day(31)),
            Some(date!(2023 - 02 - 28))
        );
        assert_eq!(
            next_tick(date!(2024 - 01 - 31), day(31)),
            Some(date!(2024 - 02 - 29))
        );
    }

    #[test]
    fn next_tick_recovers_target_day_after_clamp() {
        assert_eq!(
            next_tick(date!(2024 - 02 - 29), day(31)),
            Some(date!(2024 - 03 - 31))
        );
        assert_eq!(
            next_tick(date!(2024 - 02 - 29), day(30)),
            Some(date!(2024 - 03 - 30))
        );
    }

    #[test]
    fn next_tick_returns_none_past_max_date() {
        assert_eq!(next_tick(time::Date::MAX, day(31)), None);
    }

    #[test]
    fn schedule_for_day_31_clamps_and_recovers() {
        let dates = MonthlySchedule::after(datetime!(2024-01-31 00:00 UTC), day(31))
            .take(5)
            .collect::<Vec<_>>();

        assert_eq!(
            dates,
            [
                date!(2024 - 02 - 29),
                date!(2024 - 03 - 31),
                date!(2024 - 04 - 30),
                date!(2024 - 05 - 31),
                date!(2024 - 06 - 30),
            ]
        );
    }

    #[test]
    fn schedule_in_common_year_uses_feb_28() {
        let dates = MonthlySchedule::after(datetime!(2023-01-31 00:00 UTC), day(31))
            .take(2)
            .collect::<Vec<_>>();

        assert_eq!(dates, [date!(2023 - 02 - 28), date!(2023 - 03 - 31)]);
    }

    #[test]
    fn cloned_schedule_restarts_from_same_position() {
        let mut schedule = MonthlySchedule::after(datetime!(2024-01-01 00:00 UTC), day(15));
        schedule.next();
        let restarted = schedule.clone();

        assert_eq!(
            schedule.take(3).collect::<Vec<_>>(),
            restarted.take(3).collect::<Vec<_>>()
        );
    }
}
