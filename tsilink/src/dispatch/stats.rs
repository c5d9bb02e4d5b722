//! Request / response counters of one run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Counters and timestamps maintained by the dispatcher.
///
/// Every update is a single transition method so the numbers can be
/// checked without a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Records handed to the sink (first attempts only).
    pub number_of_requests: u64,
    /// Responses received, whatever their status.
    pub number_of_responses: u64,
    /// Responses with status >= 400.
    pub number_of_errors: u64,
    /// Records given up on after exhausting their retries.
    pub number_of_fatal_errors: u64,
    /// Resubmissions after transport errors.
    pub number_of_retries: u64,
    /// Rows dropped because they could not be resolved.
    pub number_of_skipped_rows: u64,
    pub first_request_at: Option<DateTime<Utc>>,
    pub last_request_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
}

impl Statistics {
    pub fn on_request_sent(&mut self, now: DateTime<Utc>) {
        self.number_of_requests += 1;
        self.first_request_at.get_or_insert(now);
        self.last_request_at = Some(now);
    }

    pub fn on_retry(&mut self, now: DateTime<Utc>) {
        self.number_of_retries += 1;
        self.last_request_at = Some(now);
    }

    pub fn on_response(&mut self, status: u16, now: DateTime<Utc>) {
        self.number_of_responses += 1;
        self.first_response_at.get_or_insert(now);
        self.last_response_at = Some(now);
        if status >= 400 {
            self.number_of_errors += 1;
        }
    }

    pub fn on_fatal_error(&mut self) {
        self.number_of_fatal_errors += 1;
    }

    pub fn on_skipped_row(&mut self) {
        self.number_of_skipped_rows += 1;
    }

    /// Records sent and not yet settled by a response or a fatal error.
    pub fn backlog(&self) -> u64 {
        self.number_of_requests
            .saturating_sub(self.number_of_responses + self.number_of_fatal_errors)
    }

    /// Seconds from the first request to the last response.
    pub fn elapsed_seconds(&self) -> Option<f64> {
        let first = self.first_request_at?;
        let last = self.last_response_at?;
        Some((last - first).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// Average responses per second, `None` until something was answered.
    pub fn responses_per_second(&self) -> Option<f64> {
        let elapsed = self.elapsed_seconds()?;
        if elapsed > 0.0 {
            Some(self.number_of_responses as f64 / elapsed)
        } else {
            None
        }
    }

    /// Log the final summary.
    pub fn report(&self) {
        info!(first_request_at = ?self.first_request_at, "First request");
        info!(last_response_at = ?self.last_response_at, "Last response");
        info!(
            requests = self.number_of_requests,
            responses = self.number_of_responses,
            errors = self.number_of_errors,
            fatal_errors = self.number_of_fatal_errors,
            retries = self.number_of_retries,
            skipped_rows = self.number_of_skipped_rows,
            "Final statistics"
        );
        match self.responses_per_second() {
            Some(rate) => info!("Avg responses / sec: {:.2}", rate),
            None => info!("Avg responses / sec: n/a"),
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests: {} responses: {} errors: {} fatal: {} retries: {} skipped: {}",
            self.number_of_requests,
            self.number_of_responses,
            self.number_of_errors,
            self.number_of_fatal_errors,
            self.number_of_retries,
            self.number_of_skipped_rows
        )
    }
}
