//! Throttling signal classification
//!
//! The listing API reports rate limiting as an ordinary error whose message
//! embeds the retry time, e.g.
//! `Rate Limit Exceeded. Try again on 2024-05-01 13:00:00 UTC`.
//! [`classify_signal`] is the single place that decides whether a failure is
//! such a signal.

use super::EnumerationError;
use crate::fetcher::ApiFailure;
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Statuses the provider uses for throttling
const THROTTLE_STATUSES: [u16; 2] = [420, 429];

static RETRY_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) UTC").expect("retry time pattern is valid")
});

/// Provider asked us to wait until `resume_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlingSignal {
    /// Earliest time enumeration may continue
    pub resume_at: DateTime<Utc>,
}

/// Outcome of classifying a listing failure
#[derive(Debug)]
pub enum Signal {
    /// Not a failure: wait and resume
    Throttled(ThrottlingSignal),
    /// Unrecoverable for this run
    Failed(EnumerationError),
}

/// Decide whether a listing failure is a throttling signal
///
/// A failure counts as throttling when its status is 420/429 or its message
/// mentions a rate limit. A throttling failure without a parseable retry time
/// is unrecoverable, so the run stops instead of retrying blind.
pub fn classify_signal(failure: &ApiFailure) -> Signal {
    if !is_throttle(failure) {
        return Signal::Failed(EnumerationError::Api(failure.clone()));
    }

    match parse_retry_time(failure.message()) {
        Some(resume_at) => Signal::Throttled(ThrottlingSignal { resume_at }),
        None => Signal::Failed(EnumerationError::UnparseableRetryTime(
            failure.message().to_string(),
        )),
    }
}

fn is_throttle(failure: &ApiFailure) -> bool {
    if failure
        .status()
        .is_some_and(|status| THROTTLE_STATUSES.contains(&status))
    {
        return true;
    }
    let message = failure.message().to_lowercase();
    message.contains("rate limit") || message.contains("ratelimit")
}

/// First `YYYY-MM-DD HH:MM:SS UTC` timestamp in `message`
pub fn parse_retry_time(message: &str) -> Option<DateTime<Utc>> {
    let captures = RETRY_AT.captures(message)?;
    let naive = NaiveDateTime::parse_from_str(&captures[1], "%Y-%m-%d %H:%M:%S").ok()?;
    Some(naive.and_utc())
}
