//! Instants, run windows and query steps

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PerfError, PerfResult};

/// UTC instant with millisecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

/// Closed window `[start, end]` handed to range queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

fn out_of_range<V: fmt::Display>(value: V) -> PerfError {
    PerfError::TimeRange(format!("Timestamp out of range: {}", value))
}

impl Timestamp {
    pub fn from_millis(millis: i64) -> PerfResult<Self> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Self)
            .ok_or_else(|| out_of_range(millis))
    }

    pub fn from_secs(secs: i64) -> PerfResult<Self> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self)
            .ok_or_else(|| out_of_range(secs))
    }

    /// Fractional epoch seconds, as found in query results
    pub fn from_epoch_secs_f64(secs: f64) -> PerfResult<Self> {
        if !secs.is_finite() {
            return Err(out_of_range(secs));
        }
        Self::from_millis((secs * 1000.0).round() as i64)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Fractional epoch seconds, as sent in query parameters
    pub fn epoch_secs_f64(&self) -> f64 {
        self.timestamp_millis() as f64 / 1000.0
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl TimeRange {
    /// Fails unless `start` is strictly before `end`
    pub fn new(start: Timestamp, end: Timestamp) -> PerfResult<Self> {
        if end <= start {
            return Err(PerfError::TimeRange(format!(
                "Window start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_secs(start_secs: i64, end_secs: i64) -> PerfResult<Self> {
        Self::new(Timestamp::from_secs(start_secs)?, Timestamp::from_secs(end_secs)?)
    }

    pub fn span_millis(&self) -> i64 {
        self.end.timestamp_millis() - self.start.timestamp_millis()
    }

    pub fn includes(&self, instant: Timestamp) -> bool {
        (self.start..=self.end).contains(&instant)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Timestamp(instant)
    }
}

/// Unit letter of a step such as `30s`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    const ALL: [TimeUnit; 4] = [
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    fn letter(self) -> char {
        match self {
            TimeUnit::Seconds => 's',
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
            TimeUnit::Days => 'd',
        }
    }

    fn in_seconds(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }
}

/// Query resolution or lookback in the backend's shorthand, e.g. `15s`, `1m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Step {
    pub value: i64,
    pub unit: TimeUnit,
}

impl Step {
    pub fn seconds(value: i64) -> Self {
        Step {
            value,
            unit: TimeUnit::Seconds,
        }
    }

    pub fn minutes(value: i64) -> Self {
        Step {
            value,
            unit: TimeUnit::Minutes,
        }
    }

    /// Length in milliseconds; also the candle period on time axes
    pub fn to_millis(&self) -> i64 {
        self.value * self.unit.in_seconds() * 1000
    }

    pub fn to_secs_f64(&self) -> f64 {
        (self.value * self.unit.in_seconds()) as f64
    }
}

impl FromStr for Step {
    type Err = PerfError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let mut chars = raw.chars();
        let letter = chars.next_back();
        let unit = TimeUnit::ALL
            .into_iter()
            .find(|u| Some(u.letter()) == letter)
            .ok_or_else(|| PerfError::parse(format!("Step '{}' lacks a unit of s, m, h or d", raw)))?;
        let value: i64 = chars
            .as_str()
            .parse()
            .map_err(|_| PerfError::parse(format!("Step '{}' has no integer count", raw)))?;
        if value < 1 {
            return Err(PerfError::parse(format!("Step '{}' must be positive", raw)));
        }
        Ok(Step { value, unit })
    }
}

impl TryFrom<String> for Step {
    type Error = PerfError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.to_string()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.letter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_epoch_seconds() {
        let ts = Timestamp::from_epoch_secs_f64(1_700_000_000.5).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_500);
        assert_eq!(ts.epoch_secs_f64(), 1_700_000_000.5);
        assert!(Timestamp::from_epoch_secs_f64(f64::NAN).is_err());
        assert!(Timestamp::from_epoch_secs_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_window_bounds() {
        let window = TimeRange::from_secs(1000, 2000).unwrap();

        assert_eq!(window.span_millis(), 1_000_000);
        assert!(window.includes(Timestamp::from_secs(1000).unwrap()));
        assert!(window.includes(Timestamp::from_secs(2000).unwrap()));
        assert!(!window.includes(Timestamp::from_secs(2001).unwrap()));
        assert!(TimeRange::from_secs(2000, 1000).is_err());
        assert!(TimeRange::from_secs(1000, 1000).is_err());
    }

    #[test]
    fn test_step_shorthand() {
        assert_eq!("15s".parse::<Step>().unwrap().to_millis(), 15_000);
        assert_eq!(" 1m ".parse::<Step>().unwrap(), Step::minutes(1));
        assert_eq!("2h".parse::<Step>().unwrap().to_millis(), 7_200_000);
        assert_eq!("1d".parse::<Step>().unwrap().to_secs_f64(), 86_400.0);
        assert_eq!(Step::minutes(30).to_string(), "30m");

        for bad in ["", "5x", "0m", "m", "-3s", "1.5m"] {
            assert!(bad.parse::<Step>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_step_serde() {
        let step: Step = serde_json::from_str("\"30s\"").unwrap();
        assert_eq!(step, Step::seconds(30));
        assert_eq!(serde_json::to_string(&step).unwrap(), "\"30s\"");
        assert!(serde_json::from_str::<Step>("\"30\"").is_err());
    }
}
