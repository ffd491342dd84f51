use std::cell::Cell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, Duration, Utc};
use perflog_core::metric::MetricDefinition;
use perflog_core::window::Clock;
use tokio::task::JoinHandle;

pub const API_KEY: &str = "test-api-key";
pub const ACCOUNT: &str = "4242";
pub const FIELD_XPATH: &str = "/metrics/metric/field";

/// A `data.xml` body shaped like the New Relic v1 summary response.
pub fn data_xml(metric: &str, field: &str, value: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metrics type="array">
  <metric name="{metric}" begin="2024-03-01T00:00:00Z" end="2024-03-01T00:30:00Z" app="demo" agent_id="1">
    <field type="float" name="{field}">{value}</field>
  </metric>
</metrics>
"#
    )
}

pub fn sample_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition {
            name: "Apdex".to_string(),
            application_id: 111,
            metric: "Apdex".to_string(),
            field: "score".to_string(),
            xpath: FIELD_XPATH.to_string(),
            multiplier: 1,
            scale: 2,
        },
        MetricDefinition {
            name: "Calls/min".to_string(),
            application_id: 222,
            metric: "HttpDispatcher".to_string(),
            field: "requests_per_minute".to_string(),
            xpath: FIELD_XPATH.to_string(),
            multiplier: 60,
            scale: 0,
        },
    ]
}

/// Config file body pointing at `api_base`, with the metrics from [`sample_metrics`].
pub fn sample_config_toml(api_base: &str, interval_mins: u32) -> String {
    let mut out = format!(
        "api_key = \"{API_KEY}\"\naccount = \"{ACCOUNT}\"\napi_base = \"{api_base}\"\n\
         request_timeout = \"5s\"\ninterval_mins = {interval_mins}\n"
    );
    for m in sample_metrics() {
        out.push_str(&format!(
            "\n[[metrics]]\nname = \"{}\"\napplication_id = {}\nmetric = \"{}\"\nfield = \"{}\"\n\
             xpath = \"{}\"\nmultiplier = {}\nscale = {}\n",
            m.name, m.application_id, m.metric, m.field, m.xpath, m.multiplier, m.scale
        ));
    }
    out
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub account: String,
    pub application_id: String,
    pub query: HashMap<String, String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Raw field text per remote metric name.
    pub values: HashMap<String, String>,
    /// Requests from this index onwards get `failure_status`.
    pub fail_from: Option<usize>,
    pub failure_status: StatusCode,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            values: HashMap::from([
                ("Apdex".to_string(), "0.985".to_string()),
                ("HttpDispatcher".to_string(), "12.34".to_string()),
            ]),
            fail_from: None,
            failure_status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

struct MockState {
    cfg: MockConfig,
    hits: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local stand-in for the metrics API. Aborted on drop.
pub struct MockApi {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockApi {
    pub async fn spawn(cfg: MockConfig) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            cfg,
            hits: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route(
                "/api/v1/accounts/{account}/applications/{application_id}/data.xml",
                get(data_handler),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn data_handler(
    State(state): State<Arc<MockState>>,
    Path((account, application_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let index = state.hits.fetch_add(1, Ordering::SeqCst);
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let metric = query.get("metrics[]").cloned().unwrap_or_default();
    let field = query.get("field").cloned().unwrap_or_default();

    if let Ok(mut requests) = state.requests.lock() {
        requests.push(RecordedRequest {
            account,
            application_id,
            query,
            api_key: api_key.clone(),
        });
    }

    let xml = [(header::CONTENT_TYPE, "application/xml")];
    if api_key.as_deref() != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, xml, String::new());
    }
    if state.cfg.fail_from.is_some_and(|from| index >= from) {
        return (state.cfg.failure_status, xml, String::new());
    }

    let value = state
        .cfg
        .values
        .get(&metric)
        .cloned()
        .unwrap_or_else(|| "0".to_string());
    (StatusCode::OK, xml, data_xml(&metric, &field, &value))
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    type Tz = Utc;

    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Moves forward by `step` on every read.
pub struct SteppingClock {
    current: Cell<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Cell::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    type Tz = Utc;

    fn now(&self) -> DateTime<Utc> {
        let now = self.current.get();
        self.current.set(now + self.step);
        now
    }
}
