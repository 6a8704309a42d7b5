//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloud_asset_mirror::fetcher::{
    ApiFailure, Content, ContentSource, FetchError, ListingApi, ListingPage,
};
use cloud_asset_mirror::scheduler::{ResumeScheduler, ResumeTask, SchedulingError};
use cloud_asset_mirror::Resource;
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub fn resource(id: &str, folder: &str) -> Resource {
    Resource {
        id: id.to_string(),
        source_url: format!("https://res.example.com/{id}"),
        folder: folder.to_string(),
        format: "jpg".to_string(),
        fetched_at: Utc::now(),
        bytes: None,
    }
}

pub fn throttle_message(at: DateTime<Utc>) -> ApiFailure {
    ApiFailure::Http {
        status: 420,
        message: format!(
            "Rate Limit Exceeded. Try again on {} UTC",
            at.format("%Y-%m-%d %H:%M:%S")
        ),
    }
}

/// Listing keyed by cursor ("" is the first page). Failures queued for a
/// cursor are returned before its page.
#[derive(Default)]
pub struct ScriptedListing {
    pages: HashMap<String, ListingPage>,
    failures: Mutex<HashMap<String, VecDeque<ApiFailure>>>,
    calls: Mutex<Vec<Option<String>>>,
}

impl ScriptedListing {
    pub fn page(mut self, cursor: &str, ids: &[&str], next: Option<&str>) -> Self {
        self.pages.insert(
            cursor.to_string(),
            ListingPage {
                resources: ids.iter().map(|id| resource(id, "library")).collect(),
                next_cursor: next.map(str::to_string),
            },
        );
        self
    }

    pub fn fail_once(self, cursor: &str, failure: ApiFailure) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(cursor.to_string())
            .or_default()
            .push_back(failure);
        self
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingApi for ScriptedListing {
    async fn list_page(
        &self,
        _page_size: u32,
        cursor: Option<&str>,
    ) -> Result<ListingPage, ApiFailure> {
        self.calls.lock().unwrap().push(cursor.map(str::to_string));
        let key = cursor.unwrap_or("");
        if let Some(failure) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure);
        }
        self.pages
            .get(key)
            .cloned()
            .ok_or_else(|| ApiFailure::InvalidResponse(format!("unknown cursor {key}")))
    }
}

/// Serves `body:{url}` for every URL except the ones marked broken
#[derive(Default)]
pub struct MemorySource {
    broken: Vec<String>,
    fetched: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn broken(mut self, url: &str) -> Self {
        self.broken.push(url.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch(&self, url: &str) -> Result<Content, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.broken.iter().any(|b| b == url) {
            return Err(FetchError::Status(502));
        }
        let body = format!("body:{url}");
        let chunks: Vec<Result<Bytes, FetchError>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Content {
            total_size: Some(body.len() as u64),
            stream: stream::iter(chunks).boxed(),
        })
    }
}

/// Keeps the last scheduled task until the test fires it
#[derive(Default)]
pub struct ManualScheduler {
    slot: Mutex<Option<(DateTime<Utc>, ResumeTask)>>,
}

impl ManualScheduler {
    pub fn take(&self) -> Option<(DateTime<Utc>, ResumeTask)> {
        self.slot.lock().unwrap().take()
    }
}

impl ResumeScheduler for ManualScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: ResumeTask) -> Result<(), SchedulingError> {
        *self.slot.lock().unwrap() = Some((at, task));
        Ok(())
    }

    fn pending(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().unwrap().as_ref().map(|(at, _)| *at)
    }

    fn cancel(&self) {
        self.slot.lock().unwrap().take();
    }
}
