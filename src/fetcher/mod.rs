//! Fetcher capability interface.
//!
//! The pipeline only knows this trait. The production implementation drives
//! a headless browser through the service's gated download flow; tests swap
//! in [`stub::ScriptedFetcher`] to exercise everything above it without a
//! browser or network.

pub mod browser;
pub mod stub; // Expose for tests (ScriptedFetcher)

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::resolver::ResourceId;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no download materialized within {0} seconds")]
    Timeout(u64),

    #[error("browser automation failed: {0}")]
    Automation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Progress event emitted while a fetch is in flight.
///
/// `percentage` covers the fetch phase only: a terminal event reports 100
/// even though normalization may still follow.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub message: String,
    pub percentage: u8,
}

pub type EventSender = mpsc::UnboundedSender<FetchEvent>;

/// Raw artifact produced by a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// File name the service suggested for the download, when one was seen.
    pub suggested_name: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the resource into `dest`, streaming progress into `events`.
    ///
    /// Implementations own their session state; each call must be isolated
    /// from every other call.
    async fn fetch(&self, id: &ResourceId, dest: &Path, events: &EventSender)
    -> Result<FetchedFile>;
}

/// Send an event, ignoring a closed receiver: jobs without a session have
/// nobody listening and that is fine.
pub(crate) fn emit(events: &EventSender, message: impl Into<String>, percentage: u8) {
    let _ = events.send(FetchEvent {
        message: message.into(),
        percentage,
    });
}
