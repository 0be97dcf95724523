//! Venue-local time arithmetic: occupied intervals, closing-time compliance
//! and the same-day lead-time buffer.
//!
//! All hour-of-day comparisons happen in the venue's fixed offset. Callers
//! pass "now" as UTC and it is converted here, never in the server's zone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::errors::{ReservationError, Result};

const MINUTES_PER_HOUR: u32 = 60;

/// Half-open `[start, end)` interval in minutes since venue-local midnight.
///
/// The end may lie past midnight (e.g. 23:00 + 2h = 1500); such a window is
/// simply never within business hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    pub fn starting_at(start_time: NaiveTime, duration_hours: u32) -> Self {
        let start = minute_of_day(start_time);
        TimeWindow {
            start,
            end: start.saturating_add(duration_hours.saturating_mul(MINUTES_PER_HOUR)),
        }
    }

    pub fn start_minute(&self) -> u32 {
        self.start
    }

    pub fn end_minute(&self) -> u32 {
        self.end
    }

    /// Wall-clock end, or `None` when the window runs to or past midnight.
    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_num_seconds_from_midnight_opt(self.end.checked_mul(60)?, 0)
    }

    /// Back-to-back windows sharing a boundary do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn covers(&self, minute: u32) -> bool {
        self.start <= minute && minute < self.end
    }
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * MINUTES_PER_HOUR + time.minute()
}

pub fn compute_end_time(start_time: NaiveTime, duration_hours: i32) -> Result<TimeWindow> {
    if duration_hours <= 0 {
        return Err(ReservationError::InvalidInput(format!(
            "duration must be a positive number of hours, got {}",
            duration_hours
        )));
    }
    let hours = u32::try_from(duration_hours)
        .map_err(|_| ReservationError::InvalidInput(format!("duration {} is out of range", duration_hours)))?;
    Ok(TimeWindow::starting_at(start_time, hours))
}

pub fn is_within_business_hours(window: &TimeWindow, closing_time: NaiveTime) -> bool {
    window.end <= minute_of_day(closing_time)
}

pub fn venue_now(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

/// Earliest local date-time a same-day booking may start after. A buffer
/// too large to represent pushes it to the end of time.
pub fn earliest_same_day_start(now: DateTime<Utc>, offset: FixedOffset, buffer_minutes: i64) -> NaiveDateTime {
    Duration::try_minutes(buffer_minutes)
        .and_then(|buffer| venue_now(now, offset).checked_add_signed(buffer))
        .unwrap_or(NaiveDateTime::MAX)
}

pub fn is_too_soon(
    now: DateTime<Utc>,
    offset: FixedOffset,
    date: NaiveDate,
    start_time: NaiveTime,
    buffer_minutes: i64,
) -> bool {
    if date != venue_now(now, offset).date() {
        return false;
    }
    NaiveDateTime::new(date, start_time) <= earliest_same_day_start(now, offset, buffer_minutes)
}
