use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone};

use crate::error::{PerflogError, Result};

pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%y";
pub const DISPLAY_TIME_FORMAT: &str = "%H:%M";

/// Sortable ISO-8601 form sent to the API, e.g. `2024-03-01T00:30:00.000+11:00`.
pub fn iso_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn display_date<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    ts.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn display_time<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    ts.format(DISPLAY_TIME_FORMAT).to_string()
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| PerflogError::Parse(format!("invalid duration {input}: {e}")))
}
