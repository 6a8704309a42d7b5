//! Integration tests for resuming enumeration from persisted state only

use crate::support::{resource, throttle_message, ScriptedListing};
use chrono::{Duration, Utc};
use cloud_asset_mirror::enumerator::{EnumerationError, EnumerationOutcome, Enumerator};
use cloud_asset_mirror::resume::ResumeError;
use cloud_asset_mirror::shutdown::ShutdownCoordinator;
use cloud_asset_mirror::CheckpointStore;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

fn library() -> ScriptedListing {
    ScriptedListing::default()
        .page("", &["a1", "a2"], Some("c2"))
        .page("c2", &["b1", "b2"], Some("c3"))
        .page("c3", &["c1"], Some("c4"))
        .page("c4", &["d1", "d2"], None)
}

fn enumerator(api: Arc<ScriptedListing>, dir: &Path) -> Enumerator {
    let store = CheckpointStore::open(dir).unwrap();
    Enumerator::new(api, Arc::new(Mutex::new(store)))
        .with_page_size(2)
        .with_shutdown(ShutdownCoordinator::shared())
}

fn stored_ids(dir: &Path) -> BTreeSet<String> {
    CheckpointStore::open(dir)
        .unwrap()
        .resources()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect()
}

#[tokio::test]
async fn test_throttled_run_resumes_to_same_resource_set() {
    let uninterrupted_dir = TempDir::new().unwrap();
    let outcome = enumerator(Arc::new(library()), uninterrupted_dir.path())
        .enumerate(None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, EnumerationOutcome::Completed { pages_fetched: 4, .. }));

    // Throttled after the second page; the retry time is already behind us.
    let dir = TempDir::new().unwrap();
    let past = Utc::now() - Duration::minutes(1);
    let api = Arc::new(library().fail_once("c3", throttle_message(past)));

    let first = enumerator(api.clone(), dir.path());
    let outcome = first.enumerate(None, None).await.unwrap();
    match outcome {
        EnumerationOutcome::Suspended { pages_fetched, .. } => assert_eq!(pages_fetched, 2),
        other => panic!("expected suspension, got {other:?}"),
    }
    // Simulated restart: nothing but the store directory survives.
    drop(first);

    let second = enumerator(api.clone(), dir.path());
    let outcome = second.enumerate(Some("ignored".to_string()), None).await.unwrap();
    assert_eq!(
        outcome,
        EnumerationOutcome::Completed {
            pages_fetched: 2,
            resources_recorded: 3,
        }
    );
    drop(second);

    assert_eq!(
        api.calls(),
        vec![
            None,
            Some("c2".to_string()),
            Some("c3".to_string()),
            Some("c3".to_string()),
            Some("c4".to_string()),
        ]
    );
    assert_eq!(stored_ids(dir.path()), stored_ids(uninterrupted_dir.path()));
}

#[tokio::test]
async fn test_future_resume_time_blocks_restart_without_requests() {
    let dir = TempDir::new().unwrap();
    let later = Utc::now() + Duration::hours(2);
    let api = Arc::new(library().fail_once("", throttle_message(later)));

    let outcome = enumerator(api.clone(), dir.path())
        .enumerate(None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, EnumerationOutcome::Suspended { .. }));

    let outcome = enumerator(api.clone(), dir.path())
        .enumerate(None, None)
        .await
        .unwrap();
    match outcome {
        EnumerationOutcome::Suspended {
            resume_at,
            pages_fetched,
        } => {
            assert_eq!(pages_fetched, 0);
            assert_eq!(resume_at.timestamp(), later.timestamp());
        }
        other => panic!("expected suspension, got {other:?}"),
    }
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test]
async fn test_crash_between_append_and_checkpoint_refetches_without_duplicates() {
    let dir = TempDir::new().unwrap();
    {
        // Page one was appended but its pagination upsert never happened.
        let mut store = CheckpointStore::open(dir.path()).unwrap();
        let inserted = store
            .append_resources(&[resource("a1", "library"), resource("a2", "library")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert!(store.pagination().is_none());
    }

    let api = Arc::new(library());
    let outcome = enumerator(api.clone(), dir.path())
        .enumerate(None, None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        EnumerationOutcome::Completed {
            pages_fetched: 4,
            resources_recorded: 5,
        }
    );
    let store = CheckpointStore::open(dir.path()).unwrap();
    assert_eq!(store.resource_count(), 7);
    assert_eq!(store.resources().unwrap().len(), 7);
}

#[tokio::test]
async fn test_hard_failure_keeps_committed_checkpoint() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(library().fail_once(
        "c3",
        cloud_asset_mirror::fetcher::ApiFailure::Http {
            status: 401,
            message: "Invalid credentials".to_string(),
        },
    ));

    let err = enumerator(api.clone(), dir.path())
        .enumerate(None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnumerationError::Api(_)));

    let summary = CheckpointStore::inspect(dir.path()).unwrap();
    let state = summary.pagination.unwrap();
    assert_eq!(state.cursor.as_deref(), Some("c3"));
    assert_eq!(state.page, 3);
    assert_eq!(summary.resource_count, 4);
}

#[test]
fn test_store_is_exclusive_across_handles() {
    let dir = TempDir::new().unwrap();
    let _held = CheckpointStore::open(dir.path()).unwrap();

    let err = CheckpointStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, ResumeError::LockError(_)));
    assert!(CheckpointStore::reset(dir.path()).is_err());
}
