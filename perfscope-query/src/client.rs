//! Prometheus HTTP API client
//!
//! Range queries go through the [`RangeQuery`] trait so collectors can run
//! against an in-memory backend in tests.

use async_trait::async_trait;
use perfscope_core::{PerfError, PerfResult, PromSeries, Step, TimeRange};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PrometheusConfig;

/// Range-query boundary of the metrics backend
#[async_trait]
pub trait RangeQuery: Send + Sync {
    /// Evaluate `query` over `range` at resolution `step`
    async fn query_range(
        &self,
        query: &str,
        range: &TimeRange,
        step: &Step,
    ) -> PerfResult<Vec<PromSeries>>;
}

/// Envelope of every Prometheus API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<PromSeries>,
}

/// Client for the Prometheus HTTP API
pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: String,
    config: PrometheusConfig,
}

impl PrometheusClient {
    /// Create a client for the configured backend
    pub fn new(config: PrometheusConfig) -> PerfResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| PerfError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        info!(url = %base_url, timeout_ms = config.timeout_ms, "Created Prometheus client");

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> PerfError {
        if err.is_timeout() {
            PerfError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else if err.is_connect() {
            PerfError::Connection(err.to_string())
        } else {
            PerfError::query(err.to_string())
        }
    }

    /// Probe `/-/healthy`
    pub async fn health_check(&self) -> PerfResult<()> {
        let response = self
            .request("/-/healthy")
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PerfError::Connection(format!(
                "Health check failed with HTTP {}",
                status
            )));
        }
        debug!(url = %self.base_url, "Prometheus is healthy");
        Ok(())
    }
}

/// Decode a `query_range` response body
fn parse_response(status: reqwest::StatusCode, body: &str) -> PerfResult<Vec<PromSeries>> {
    let parsed: ApiResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(PerfError::parse(format!("Invalid query_range response: {}", e)))
        }
        Err(_) => {
            return Err(PerfError::query(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )))
        }
    };

    if parsed.status != "success" {
        return Err(PerfError::Backend {
            error_type: parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: parsed.error.unwrap_or_else(|| format!("HTTP {}", status)),
        });
    }

    for warning in &parsed.warnings {
        warn!(warning = %warning, "Prometheus returned a warning");
    }

    let data = parsed
        .data
        .ok_or_else(|| PerfError::parse("Successful response without data"))?;
    if data.result_type != "matrix" && data.result_type != "vector" {
        return Err(PerfError::parse(format!(
            "Unsupported result type '{}'",
            data.result_type
        )));
    }
    Ok(data.result)
}

#[async_trait]
impl RangeQuery for PrometheusClient {
    async fn query_range(
        &self,
        query: &str,
        range: &TimeRange,
        step: &Step,
    ) -> PerfResult<Vec<PromSeries>> {
        let start_time = Instant::now();
        let start = range.start.epoch_secs_f64().to_string();
        let end = range.end.epoch_secs_f64().to_string();
        let step_str = step.to_string();

        debug!(query, %range, step = %step_str, "Executing range query");

        let response = self
            .request("/api/v1/query_range")
            .query(&[
                ("query", query),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step_str.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let result = parse_response(status, &body)?;
        debug!(
            series = result.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Range query completed"
        );
        Ok(result)
    }
}
