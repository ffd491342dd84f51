use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, Local};
use testkit::{API_KEY, MockApi, MockConfig, sample_config_toml};

const ENV_OVERRIDES: [&str; 7] = [
    "PERFLOG_API_KEY",
    "PERFLOG_ACCOUNT",
    "PERFLOG_API_BASE",
    "PERFLOG_PROXY_HOST",
    "PERFLOG_PROXY_PORT",
    "PERFLOG_REQUEST_TIMEOUT",
    "PERFLOG_INTERVAL_MINS",
];

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_perflog")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    run_with_env(config, args, &[])
}

fn run_with_env(config: &Path, args: &[&str], vars: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(bin());
    cmd.args(args).env("PERFLOG_CONFIG", config);
    for key in ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd.envs(vars.iter().copied());
    cmd.output().unwrap()
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_report_for_today() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 720));

    let output = run(&config, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "Date\tTime\tApdex\tCalls/min");
    // Zero rows is possible when the run starts exactly at midnight.
    let rows = &lines[1..];
    assert!(rows.len() <= 2, "{lines:?}");
    for row in rows {
        let cols: Vec<_> = row.split('\t').collect();
        assert_eq!(cols.len(), 4, "{row}");
        assert_eq!(&cols[2..], ["0.99", "740"]);
    }
    assert_eq!(api.request_count(), rows.len() * 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_day_offset_starts_yesterday() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 720));

    let output = run(&config, &["-D", "1"]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert!(lines.len() >= 3, "{lines:?}");

    let first = &api.requests()[0];
    assert_eq!(first.query["summary"], "1");
    assert!(first.query["begin"].contains("T00:00:00.000"));

    // The day is taken from the request so a run that crosses midnight still agrees.
    let begin = DateTime::parse_from_rfc3339(&first.query["begin"]).unwrap();
    assert!(begin.date_naive() < Local::now().date_naive());
    let day = begin.format("%d/%m/%y").to_string();
    assert!(lines[1].starts_with(&format!("{day}\t00:00 - 12:00\t")), "{lines:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_non_2xx_aborts_before_any_row() {
    let api = MockApi::spawn(MockConfig {
        fail_from: Some(0),
        ..MockConfig::default()
    })
    .await
    .unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 30));

    let output = run(&config, &["-D", "1"]);
    assert!(!output.status.success());
    assert_eq!(stdout_lines(&output), ["Date\tTime\tApdex\tCalls/min"]);
    assert!(String::from_utf8_lossy(&output.stderr).contains("500"));
    assert_eq!(api.request_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_failure_mid_run_keeps_earlier_rows() {
    let api = MockApi::spawn(MockConfig {
        fail_from: Some(3),
        ..MockConfig::default()
    })
    .await
    .unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 30));

    let output = run(&config, &["-D", "1"]);
    assert!(!output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[1].contains("\t00:00 - 00:30\t"));
    assert_eq!(api.request_count(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_bad_arguments_fail_before_requests() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 30));

    for args in [
        vec!["-D"],
        vec!["-D", "abc"],
        vec!["--bogus"],
        vec!["-X", "1"],
    ] {
        let output = run(&config, &args);
        assert!(!output.status.success(), "{args:?}");
        assert!(output.stdout.is_empty(), "{args:?}");
        assert!(!output.stderr.is_empty(), "{args:?}");
    }
    assert_eq!(api.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_invalid_config_fails_fast() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        &format!("account = \"1\"\napi_base = \"{}\"\n", api.base_url()),
    );

    let output = run(&config, &[]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("api_key"));
    assert_eq!(api.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_env_api_key_overrides_file() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let raw = sample_config_toml(&api.base_url(), 720).replace(API_KEY, "stale-key");
    let config = write_config(temp.path(), &raw);

    let output = run_with_env(&config, &["-D", "1"], &[("PERFLOG_API_KEY", API_KEY)]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let requests = api.requests();
    assert!(!requests.is_empty());
    assert!(requests.iter().all(|r| r.api_key.as_deref() == Some(API_KEY)));
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_env_interval_changes_windows() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 30));

    let output = run_with_env(&config, &["-D", "1"], &[("PERFLOG_INTERVAL_MINS", "720")]);
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert!(lines[1].contains("\t00:00 - 12:00\t"), "{lines:?}");
    assert!(lines[2].contains("\t12:00 - 00:00\t"), "{lines:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_malformed_env_number_fails_fast() {
    let api = MockApi::spawn(MockConfig::default()).await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(temp.path(), &sample_config_toml(&api.base_url(), 30));

    let output = run_with_env(&config, &[], &[("PERFLOG_PROXY_PORT", "notaport")]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PERFLOG_PROXY_PORT"));
    assert_eq!(api.request_count(), 0);
}
