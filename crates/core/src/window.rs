use std::fmt::Display;

use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta, TimeZone};

use crate::error::{PerflogError, Result};
use crate::time::{display_date, display_time};

/// Source of "now". The report loop consults it before every window.
pub trait Clock {
    type Tz: TimeZone;

    fn now(&self) -> DateTime<Self::Tz>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> TimeWindow<Tz> {
    /// Returns `None` if `start + interval` overflows, or if `interval` is not positive.
    pub fn starting_at(start: DateTime<Tz>, interval: TimeDelta) -> Option<Self> {
        if interval <= TimeDelta::zero() {
            return None;
        }
        let end = start.clone().checked_add_signed(interval)?;
        Some(Self { start, end })
    }
}

impl<Tz: TimeZone> TimeWindow<Tz>
where
    Tz::Offset: Display,
{
    pub fn date_label(&self) -> String {
        display_date(&self.start)
    }

    pub fn time_label(&self) -> String {
        format!("{} - {}", display_time(&self.start), display_time(&self.end))
    }
}

/// Midnight of the day containing `now`, moved back `offset_days` days, in `now`'s zone.
pub fn day_start<Tz: TimeZone>(now: &DateTime<Tz>, offset_days: u32) -> Result<DateTime<Tz>> {
    let date = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(offset_days)))
        .ok_or_else(|| {
            PerflogError::InvalidArgument(format!("day offset {offset_days} is out of range"))
        })?;

    now.timezone()
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .ok_or_else(|| PerflogError::Time(format!("local midnight does not exist on {date}")))
}

/// Contiguous windows from `start` while the window start is before the clock's
/// current time. The clock is read on every step, so a slow consumer sees windows
/// that did not exist yet when iteration began.
pub struct Windows<'a, C: Clock> {
    clock: &'a C,
    next_start: DateTime<C::Tz>,
    interval: TimeDelta,
}

impl<'a, C: Clock> Windows<'a, C> {
    pub fn new(clock: &'a C, start: DateTime<C::Tz>, interval: TimeDelta) -> Self {
        Self {
            clock,
            next_start: start,
            interval,
        }
    }
}

impl<C: Clock> Iterator for Windows<'_, C> {
    type Item = TimeWindow<C::Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.clock.now() {
            return None;
        }
        let window = TimeWindow::starting_at(self.next_start.clone(), self.interval)?;
        self.next_start = window.end.clone();
        Some(window)
    }
}
