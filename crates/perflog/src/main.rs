mod cli;
mod client;
mod output;
mod report;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use perflog_core::config::Config;
use perflog_core::window::SystemClock;

use crate::cli::Cli;
use crate::client::ApiClient;
use crate::report::ReportDriver;
use crate::telemetry::init_cli_tracing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing();

    let cfg = Config::load().context("load configuration")?;
    if cfg.metrics.is_empty() {
        tracing::warn!("no metrics configured; report will only contain dates and times");
    }

    let client = ApiClient::from_config(&cfg).context("build http client")?;
    let clock = SystemClock;
    let driver = ReportDriver::new(&cfg.metrics, cfg.interval_mins, &client, &clock);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let rows = driver
        .run(cli.days, &mut out)
        .await
        .context("report aborted")?;

    tracing::info!(rows, "report complete");
    Ok(())
}
