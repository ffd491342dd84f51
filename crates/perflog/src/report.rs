use std::fmt::Display;
use std::io::Write;

use chrono::{TimeDelta, TimeZone};
use perflog_core::Result;
use perflog_core::metric::MetricDefinition;
use perflog_core::time::iso_timestamp;
use perflog_core::window::{Clock, TimeWindow, Windows, day_start};

use crate::client::ApiClient;
use crate::output::{ReportRow, header_line, write_line};

/// Where raw metric text comes from for a given window.
pub trait MetricSource {
    async fn fetch<Tz: TimeZone>(
        &self,
        window: &TimeWindow<Tz>,
        metric: &MetricDefinition,
    ) -> Result<String>
    where
        Tz::Offset: Display;
}

impl MetricSource for ApiClient {
    async fn fetch<Tz: TimeZone>(
        &self,
        window: &TimeWindow<Tz>,
        metric: &MetricDefinition,
    ) -> Result<String>
    where
        Tz::Offset: Display,
    {
        self.retrieve(window, metric).await
    }
}

pub struct ReportDriver<'a, S, C> {
    metrics: &'a [MetricDefinition],
    interval: TimeDelta,
    source: &'a S,
    clock: &'a C,
}

impl<'a, S, C> ReportDriver<'a, S, C>
where
    S: MetricSource,
    C: Clock,
    <C::Tz as TimeZone>::Offset: Display,
{
    pub fn new(
        metrics: &'a [MetricDefinition],
        interval_mins: u32,
        source: &'a S,
        clock: &'a C,
    ) -> Self {
        Self {
            metrics,
            interval: TimeDelta::minutes(i64::from(interval_mins)),
            source,
            clock,
        }
    }

    /// Prints the header, then one row per window from the day start until the clock
    /// catches up. Returns the number of data rows written.
    ///
    /// A row is written only once every metric in it has been fetched and transformed,
    /// so an error never leaves a short row behind.
    pub async fn run<W: Write>(&self, offset_days: u32, out: &mut W) -> Result<usize> {
        let start = day_start(&self.clock.now(), offset_days)?;
        tracing::info!(
            start = %iso_timestamp(&start),
            interval_mins = self.interval.num_minutes(),
            metrics = self.metrics.len(),
            "starting report"
        );

        write_line(out, &header_line(self.metrics))?;

        let mut rows = 0;
        for window in Windows::new(self.clock, start, self.interval) {
            let row = self.collect_row(&window).await?;
            write_line(out, &row.to_tsv())?;
            rows += 1;
        }
        Ok(rows)
    }

    async fn collect_row(&self, window: &TimeWindow<C::Tz>) -> Result<ReportRow> {
        let mut values = Vec::with_capacity(self.metrics.len());
        for metric in self.metrics {
            let raw = self.source.fetch(window, metric).await?;
            values.push(metric.transform(&raw)?);
        }
        tracing::debug!(window = %window.time_label(), "window complete");
        Ok(ReportRow::new(window, values))
    }
}
