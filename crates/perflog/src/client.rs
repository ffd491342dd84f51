use std::fmt::Display;
use std::fs;

use chrono::TimeZone;
use perflog_core::config::Config;
use perflog_core::metric::MetricDefinition;
use perflog_core::time::iso_timestamp;
use perflog_core::window::TimeWindow;
use perflog_core::{PerflogError, Result};
use reqwest::{Certificate, Client, Proxy};
use sxd_xpath::Value;

/// HTTP access to the metrics data API. Built once per run and shared by every request.
pub struct ApiClient {
    http: Client,
    api_base: String,
    account: String,
    api_key: String,
}

impl ApiClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent(concat!("perflog/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = cfg.ca_cert_path.as_ref() {
            let bytes = fs::read(path).map_err(|e| {
                PerflogError::Config(format!("failed reading CA cert {}: {e}", path.display()))
            })?;
            let cert = Certificate::from_pem(&bytes).map_err(|e| {
                PerflogError::Config(format!("invalid CA cert {}: {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(proxy_url) = cfg.proxy_url() {
            let proxy = Proxy::all(&proxy_url)
                .map_err(|e| PerflogError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| PerflogError::Config(format!("failed building http client: {e}")))?;

        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            account: cfg.account.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn data_url(&self, application_id: u64) -> String {
        format!(
            "{}/api/v1/accounts/{}/applications/{}/data.xml",
            self.api_base, self.account, application_id
        )
    }

    /// Fetches one metric summary for `window` and returns the text selected by its XPath.
    pub async fn retrieve<Tz: TimeZone>(
        &self,
        window: &TimeWindow<Tz>,
        metric: &MetricDefinition,
    ) -> Result<String>
    where
        Tz::Offset: Display,
    {
        let url = self.data_url(metric.application_id);
        let begin = iso_timestamp(&window.start);
        let end = iso_timestamp(&window.end);
        tracing::debug!(
            metric = %metric.metric,
            field = %metric.field,
            %begin,
            %end,
            "requesting metric"
        );

        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("metrics[]", metric.metric.as_str()),
                ("field", metric.field.as_str()),
                ("begin", begin.as_str()),
                ("end", end.as_str()),
                ("summary", "1"),
            ])
            .send()
            .await
            .map_err(|e| PerflogError::Transport(format!("GET {url}: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PerflogError::Transport(format!("reading body from {url}: {e}")))?;
        let body = validate_and_read_body(status, body)?;
        extract_value(&body, &metric.xpath)
    }
}

/// Passes the body through for 2xx statuses.
pub fn validate_and_read_body(status: u16, body: String) -> Result<String> {
    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(PerflogError::RemoteRequest { status })
    }
}

/// Evaluates `xpath` against the XML `body` and returns the string value of the result.
pub fn extract_value(body: &str, xpath: &str) -> Result<String> {
    let package = sxd_document::parser::parse(body)
        .map_err(|e| PerflogError::Extraction(format!("malformed XML response: {e:?}")))?;
    let document = package.as_document();

    let value = sxd_xpath::evaluate_xpath(&document, xpath)
        .map_err(|e| PerflogError::Extraction(format!("xpath {xpath:?} failed: {e:?}")))?;
    if let Value::Nodeset(nodes) = &value
        && nodes.size() == 0
    {
        return Err(PerflogError::Extraction(format!(
            "xpath {xpath:?} matched nothing"
        )));
    }
    Ok(value.string())
}
