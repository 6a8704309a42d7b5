//! Throttle classification of listing failures

use chrono::{TimeZone, Utc};
use cloud_asset_mirror::enumerator::signal::{classify_signal, parse_retry_time, Signal};
use cloud_asset_mirror::enumerator::EnumerationError;
use cloud_asset_mirror::fetcher::ApiFailure;

#[test]
fn test_provider_throttle_message_yields_resume_time() {
    let failure = ApiFailure::Http {
        status: 420,
        message: "Rate Limit Exceeded. Try again on 2024-03-09 17:45:00 UTC".to_string(),
    };

    match classify_signal(&failure) {
        Signal::Throttled(signal) => assert_eq!(
            signal.resume_at,
            Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap()
        ),
        Signal::Failed(err) => panic!("expected throttling, got {err}"),
    }
}

#[test]
fn test_429_with_time_is_throttling() {
    let failure = ApiFailure::Http {
        status: 429,
        message: "Too many requests, retry after 2025-12-31 23:59:59 UTC please".to_string(),
    };
    assert!(matches!(classify_signal(&failure), Signal::Throttled(_)));
}

#[test]
fn test_throttle_without_time_is_fatal() {
    let failure = ApiFailure::Http {
        status: 420,
        message: "Rate Limit Exceeded".to_string(),
    };
    assert!(matches!(
        classify_signal(&failure),
        Signal::Failed(EnumerationError::UnparseableRetryTime(_))
    ));
}

#[test]
fn test_non_throttling_failures_pass_through() {
    for failure in [
        ApiFailure::Http {
            status: 500,
            message: "General error".to_string(),
        },
        ApiFailure::Network("connection refused".to_string()),
        ApiFailure::InvalidResponse("missing resources".to_string()),
    ] {
        assert!(matches!(
            classify_signal(&failure),
            Signal::Failed(EnumerationError::Api(_))
        ));
    }
}

#[test]
fn test_first_timestamp_wins() {
    let parsed = parse_retry_time("on 2024-01-01 00:00:01 UTC or 2024-01-02 00:00:00 UTC").unwrap();
    assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
    assert!(parse_retry_time("2024-13-01 00:00:00 UTC").is_none());
}
