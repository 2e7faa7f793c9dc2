//! Download orchestration.
//!
//! One [`DownloadPipeline::run`] call carries a request through the whole
//! flow: resolve the share link, compute the target path, short-circuit if
//! the file is already there, fetch through the [`Fetcher`], normalize the
//! raw artifact, and finalize the session's progress record. Each run owns
//! its browser session, its temp file, and its progress record, so
//! concurrent runs need no coordination beyond the progress store's lock.
//!
//! Only link resolution and the fetch itself can fail a job. Everything
//! after bytes have landed (extraction, repacking, format validation)
//! degrades to keeping what was fetched and still reports success.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::models::{Category, DownloadRequest};
use crate::archive::{self, Disposition};
use crate::fetcher::{FetchError, FetchEvent, FetchedFile, Fetcher};
use crate::humanize::ByteSize;
use crate::observability::Metrics;
use crate::progress::{ProgressStatus, ProgressTracker};
use crate::resolver::{self, ResolveError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Terminal result handed back to the submitter. The message always states
/// which path the job took (already existed, extracted, repacked, kept raw,
/// validation outcome).
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub file_path: PathBuf,
    pub message: String,
}

pub struct DownloadPipeline {
    fetcher: Arc<dyn Fetcher>,
    tracker: Arc<ProgressTracker>,
    metrics: Arc<Metrics>,
    models_root: PathBuf,
}

impl DownloadPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        tracker: Arc<ProgressTracker>,
        metrics: Arc<Metrics>,
        models_root: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            tracker,
            metrics,
            models_root,
        }
    }

    /// Absolute target path for a request: fixed category directories hang
    /// off the models root, `custom` uses the caller's directory directly.
    pub fn target_location(&self, request: &DownloadRequest) -> PathBuf {
        let base = match request.category {
            Category::Custom => {
                PathBuf::from(request.custom_path.as_deref().unwrap_or_default())
            }
            fixed => self
                .models_root
                .join(fixed.dir_name().expect("non-custom category has a directory")),
        };
        base.join(&request.file_name)
    }

    /// Run one download job to its terminal state, maintaining the session's
    /// progress record throughout when the request carries a session token.
    pub async fn run(&self, request: DownloadRequest) -> Result<JobOutcome> {
        let job_id = Uuid::now_v7();
        let session = request.session_id.clone();

        if let Some(session) = &session {
            self.tracker.begin(session).await;
        }
        self.metrics.download_started();

        let result = self.execute(&request, job_id).await;

        match &result {
            Ok(outcome) => {
                info!(%job_id, path = %outcome.file_path.display(), "download job completed");
                if let Some(session) = &session {
                    self.tracker
                        .finish(session, ProgressStatus::Completed, outcome.message.clone())
                        .await;
                }
                self.metrics.download_completed();
            }
            Err(err) => {
                warn!(%job_id, error = %err, "download job failed");
                if let Some(session) = &session {
                    self.tracker
                        .finish(session, ProgressStatus::Error, err.to_string())
                        .await;
                }
                self.metrics.download_failed();
            }
        }

        result
    }

    async fn execute(&self, request: &DownloadRequest, job_id: Uuid) -> Result<JobOutcome> {
        let id = resolver::resolve(&request.link)?;
        info!(%job_id, file_id = %id, "resolved share link");

        let target = self.target_location(request);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Idempotent short-circuit: nothing to fetch unless asked to redo it.
        if target.exists() && !request.overwrite {
            info!(%job_id, path = %target.display(), "target already exists, skipping fetch");
            return Ok(JobOutcome {
                message: format!("File already exists: {}", target.display()),
                file_path: target,
            });
        }

        // Fetch into a job-scoped temp path so a partial download can never
        // clobber an existing target.
        let raw_path =
            std::env::temp_dir().join(format!("drivefetch_{}_{}.tmp", id.as_str(), job_id));

        let (event_tx, drain) = self.spawn_event_drain(session_of(request));
        let fetch_result = self.fetcher.fetch(&id, &raw_path, &event_tx).await;
        drop(event_tx);
        if let Some(drain) = drain {
            // all in-flight events fold into the tracker before the terminal
            // record is written
            let _ = drain.await;
        }

        let fetched = match fetch_result {
            Ok(fetched) => fetched,
            Err(err) => {
                let _ = tokio::fs::remove_file(&raw_path).await;
                return Err(err.into());
            }
        };

        let placed = self.place(request, &fetched, &raw_path, &target).await;
        if placed.is_err() {
            let _ = tokio::fs::remove_file(&raw_path).await;
        }
        placed
    }

    /// Move the raw artifact to its final shape at the target path.
    async fn place(
        &self,
        request: &DownloadRequest,
        fetched: &FetchedFile,
        raw_path: &PathBuf,
        target: &PathBuf,
    ) -> Result<JobOutcome> {
        let mut message;

        if request.auto_extract && archive::is_zip_archive(raw_path) {
            if let Some(session) = session_of(request) {
                self.tracker.update(session, "Extracting archive", 100).await;
            }

            let raw = raw_path.clone();
            let tgt = target.clone();
            let disposition = tokio::task::spawn_blocking(move || archive::normalize(&raw, &tgt))
                .await
                .map_err(|e| PipelineError::Io(io::Error::other(e)))??;

            message = match &disposition {
                Disposition::SingleMember { member } => {
                    self.metrics.archive_extracted();
                    format!("Download completed: extracted {member}")
                }
                Disposition::Repacked { members: 1 } => {
                    self.metrics.archive_extracted();
                    "Download completed: extracted single file from archive".to_string()
                }
                Disposition::Repacked { members } => {
                    self.metrics.archive_extracted();
                    format!("Download completed: repacked {members} files into a single archive")
                }
                Disposition::KeptRaw { reason } => {
                    format!("Download completed: kept original archive (extraction failed: {reason})")
                }
            };
        } else {
            archive::replace_file(raw_path, target)?;
            message = format!(
                "Download completed: {} ({})",
                request.file_name,
                ByteSize(fetched.bytes)
            );
        }

        // Soft post-check of recognized model formats; the artifact stays
        // either way.
        match archive::validate_target(target) {
            Some(Ok(())) => message.push_str("; format validation passed"),
            Some(Err(err)) => {
                warn!(path = %target.display(), error = %err, "format validation failed");
                message.push_str(&format!("; format validation failed: {err} (file kept)"));
            }
            None => {}
        }

        Ok(JobOutcome {
            file_path: target.clone(),
            message,
        })
    }

    /// Forward fetch events into the session's progress record. Jobs without
    /// a session get a sender whose receiver is already gone; emits become
    /// no-ops.
    fn spawn_event_drain(
        &self,
        session: Option<&str>,
    ) -> (mpsc::UnboundedSender<FetchEvent>, Option<JoinHandle<()>>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<FetchEvent>();

        let Some(session) = session else {
            return (tx, None);
        };

        let session = session.to_string();
        let tracker = Arc::clone(&self.tracker);
        let drain = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracker
                    .update(&session, event.message, event.percentage)
                    .await;
            }
        });

        (tx, Some(drain))
    }
}

fn session_of(request: &DownloadRequest) -> Option<&str> {
    request.session_id.as_deref()
}
