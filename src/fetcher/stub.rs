//! Scripted fetcher for tests.
//!
//! Emits a deterministic sequence of synthetic progress events and writes a
//! fixed payload to the destination, so the pipeline, API, and progress
//! store can be exercised without Chromium or the network.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EventSender, FetchError, FetchedFile, Fetcher, Result, emit};
use crate::resolver::ResourceId;

#[derive(Debug, Clone)]
enum ScriptedFailure {
    Timeout(u64),
    Automation(String),
}

pub struct ScriptedFetcher {
    payload: Vec<u8>,
    events: Vec<(String, u8)>,
    failure: Option<ScriptedFailure>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// Fetcher that succeeds immediately with the given payload.
    pub fn with_bytes(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            events: vec![
                ("Opening share page".to_string(), 0),
                ("Waiting for download to start".to_string(), 50),
                ("Download received".to_string(), 100),
            ],
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Override the emitted event script.
    pub fn with_events(mut self, events: Vec<(String, u8)>) -> Self {
        self.events = events;
        self
    }

    /// Fetcher that exhausts its (virtual) budget without producing bytes.
    pub fn failing_timeout() -> Self {
        Self {
            payload: Vec::new(),
            events: vec![("Waiting for download to start".to_string(), 50)],
            failure: Some(ScriptedFailure::Timeout(60)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetcher that fails with a browser automation error.
    pub fn failing_automation(reason: impl Into<String>) -> Self {
        Self {
            payload: Vec::new(),
            events: Vec::new(),
            failure: Some(ScriptedFailure::Automation(reason.into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times `fetch` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _id: &ResourceId,
        dest: &Path,
        events: &EventSender,
    ) -> Result<FetchedFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        for (message, percentage) in &self.events {
            emit(events, message.clone(), *percentage);
        }

        if let Some(failure) = &self.failure {
            return Err(match failure {
                ScriptedFailure::Timeout(secs) => FetchError::Timeout(*secs),
                ScriptedFailure::Automation(reason) => FetchError::Automation(reason.clone()),
            });
        }

        tokio::fs::write(dest, &self.payload).await?;

        Ok(FetchedFile {
            path: dest.to_path_buf(),
            bytes: self.payload.len() as u64,
            suggested_name: None,
        })
    }
}
