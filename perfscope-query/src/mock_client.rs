//! In-memory range-query backend for unit testing
//!
//! Responses are registered against a substring of the query text and,
//! optionally, the start of the run window. Later registrations take
//! precedence over earlier ones. Unmatched queries return no series.

use async_trait::async_trait;
use perfscope_core::{PerfError, PerfResult, PromSample, PromSeries, Step, TimeRange, Timestamp};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::trace;

use crate::client::RangeQuery;

#[derive(Debug, Clone)]
enum MockResponse {
    Series(Vec<PromSeries>),
    Error(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    window_start: Option<Timestamp>,
    response: MockResponse,
}

/// A query received by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub query: String,
    pub range: TimeRange,
    pub step: Step,
}

/// Mock range-query backend
#[derive(Debug, Default)]
pub struct MockRangeQuery {
    rules: Vec<Rule>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockRangeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `pattern` with `series`
    pub fn respond(self, pattern: &str, series: Vec<PromSeries>) -> Self {
        self.rule(pattern, None, MockResponse::Series(series))
    }

    /// Like [`respond`](Self::respond) but only for windows starting at `start`
    pub fn respond_in(self, pattern: &str, start: Timestamp, series: Vec<PromSeries>) -> Self {
        self.rule(pattern, Some(start), MockResponse::Series(series))
    }

    /// Fail queries containing `pattern`
    pub fn fail(self, pattern: &str, message: &str) -> Self {
        self.rule(pattern, None, MockResponse::Error(message.to_string()))
    }

    /// Fail queries containing `pattern` for windows starting at `start`
    pub fn fail_in(self, pattern: &str, start: Timestamp, message: &str) -> Self {
        self.rule(pattern, Some(start), MockResponse::Error(message.to_string()))
    }

    fn rule(mut self, pattern: &str, window_start: Option<Timestamp>, response: MockResponse) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            window_start,
            response,
        });
        self
    }

    /// Every query received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RangeQuery for MockRangeQuery {
    async fn query_range(
        &self,
        query: &str,
        range: &TimeRange,
        step: &Step,
    ) -> PerfResult<Vec<PromSeries>> {
        trace!(query, "Mock range query");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                query: query.to_string(),
                range: range.clone(),
                step: *step,
            });
        }

        let rule = self.rules.iter().rev().find(|rule| {
            query.contains(&rule.pattern)
                && rule.window_start.map_or(true, |start| start == range.start)
        });

        match rule.map(|r| &r.response) {
            Some(MockResponse::Series(series)) => Ok(series.clone()),
            Some(MockResponse::Error(message)) => Err(PerfError::query(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Build a series from labels and `(epoch seconds, value)` pairs
pub fn series(labels: &[(&str, &str)], values: &[(f64, f64)]) -> PromSeries {
    let metric: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let samples = values
        .iter()
        .map(|(ts, v)| PromSample::new(*ts, format_value(*v)))
        .collect();
    PromSeries::new(metric, samples)
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_and_precedence() {
        let range = TimeRange::from_secs(100, 200).unwrap();
        let other = TimeRange::from_secs(300, 400).unwrap();
        let mock = MockRangeQuery::new()
            .respond("up", vec![series(&[], &[(100.0, 1.0)])])
            .fail_in("up", range.start, "boom");

        assert!(mock.query_range("up", &range, &Step::minutes(1)).await.is_err());
        let ok = mock.query_range("up", &other, &Step::minutes(1)).await.unwrap();
        assert_eq!(ok[0].last_value().unwrap(), 1.0);
        assert!(mock
            .query_range("down", &other, &Step::minutes(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(mock.calls().len(), 3);
    }

    #[test]
    fn test_series_helper() {
        let s = series(&[("le", "+Inf")], &[(1.0, f64::NAN), (2.0, 3.5)]);
        assert_eq!(s.label("le"), Some("+Inf"));
        assert_eq!(s.values[0].value, "NaN");
        assert_eq!(s.last_value().unwrap(), 3.5);
    }
}
