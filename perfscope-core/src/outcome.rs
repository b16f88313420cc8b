//! Per-item results for batch collection over many runs and metrics.
//!
//! A failed query must not void the rest of a batch. Instead of dropping
//! errors, collectors turn each query into an [`Outcome`] and keep the
//! [`Failure`] records next to the data they were meant to fill.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::PerfError;

/// A recorded failure for one `(run, item)` cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub run: String,
    pub item: String,
    pub reason: String,
}

impl Failure {
    pub fn new<R, I, S>(run: R, item: I, reason: S) -> Self
    where
        R: Into<String>,
        I: Into<String>,
        S: Into<String>,
    {
        Self {
            run: run.into(),
            item: item.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.run, self.item, self.reason)
    }
}

/// Either a value or the reason it could not be produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Value(T),
    Failed(Failure),
}

impl<T> Outcome<T> {
    /// Wrap a fallible result for the given run and item
    pub fn from_result(run: &str, item: &str, result: Result<T, PerfError>) -> Self {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(err) => {
                debug!(run, item, category = err.category(), "Collection step failed");
                Outcome::Failed(Failure::new(run, item, err.to_string()))
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    /// Take the value, moving any failure into `failures` (and logging it)
    pub fn record(self, failures: &mut Vec<Failure>) -> Option<T> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Failed(failure) => {
                warn!(
                    run = %failure.run,
                    item = %failure.item,
                    reason = %failure.reason,
                    "Query failed, recording missing value"
                );
                failures.push(failure);
                None
            }
        }
    }
}
