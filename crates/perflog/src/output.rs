use std::fmt::Display;
use std::io::Write;

use chrono::TimeZone;
use perflog_core::metric::MetricDefinition;
use perflog_core::window::TimeWindow;
use perflog_core::{PerflogError, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub date: String,
    pub window: String,
    pub values: Vec<Decimal>,
}

impl ReportRow {
    pub fn new<Tz: TimeZone>(window: &TimeWindow<Tz>, values: Vec<Decimal>) -> Self
    where
        Tz::Offset: Display,
    {
        Self {
            date: window.date_label(),
            window: window.time_label(),
            values,
        }
    }

    pub fn to_tsv(&self) -> String {
        let mut line = format!("{}\t{}", self.date, self.window);
        for value in &self.values {
            line.push('\t');
            line.push_str(&value.to_string());
        }
        line
    }
}

pub fn header_line(metrics: &[MetricDefinition]) -> String {
    let mut line = String::from("Date\tTime");
    for metric in metrics {
        line.push('\t');
        line.push_str(&metric.name);
    }
    line
}

/// Writes one line and flushes so rows show up as each window completes.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{line}")
        .and_then(|()| out.flush())
        .map_err(|e| PerflogError::Io(format!("failed writing report: {e}")))
}
