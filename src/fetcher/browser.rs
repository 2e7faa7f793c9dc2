//! Headless-browser fetcher for the gated download flow.
//!
//! The sharing service has no stable download API: depending on file size,
//! virus-scan state, and which UI variant it serves, the export URL either
//! streams an attachment immediately, shows a warning interstitial with a
//! "Download anyway" control, or renders a preview page with a download
//! affordance somewhere in it. This fetcher opens one throwaway Chromium
//! session per call, registers download listeners before navigating so an
//! instant attachment is never missed, then walks an escalating fallback
//! ladder until bytes land or the budget runs out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EventSender, FetchError, FetchedFile, Fetcher, Result, emit};
use crate::archive::replace_file;
use crate::humanize::ByteSize;
use crate::resolver::ResourceId;

/// Selectors probed for a download affordance when nothing fires on load.
const FALLBACK_SELECTORS: &[&str] = &[
    "[aria-label=\"Download\"]",
    "a[href*=\"export=download\"]",
    "#uc-download-link",
    "form#download-form [type=\"submit\"]",
];

/// The warning interstitial labels its confirm control with text, not a
/// stable id, so it needs an xpath probe.
const DOWNLOAD_ANYWAY_XPATH: &str =
    "//a[contains(., 'Download anyway')] | //button[contains(., 'Download anyway')]";

const EXPORT_BASE_URL: &str = "https://drive.google.com/uc?export=download";

#[derive(Debug, Clone)]
pub struct BrowserFetcherConfig {
    /// Total budget for waiting on a download event before falling back.
    pub budget: Duration,
    /// Sleep step inside the bounded wait loop.
    pub poll_interval: Duration,
    /// How often a progress event is emitted while waiting.
    pub progress_interval: Duration,
    pub user_agent: String,
    /// Parent for job-scoped browser download directories; system temp when
    /// unset.
    pub download_dir: Option<PathBuf>,
}

impl Default for BrowserFetcherConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(5),
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            )
            .to_string(),
            download_dir: None,
        }
    }
}

/// Where the browser's download stands, as seen from the CDP event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DownloadPhase {
    Idle,
    Began {
        suggested_name: Option<String>,
    },
    Done {
        guid: String,
        suggested_name: Option<String>,
    },
    Canceled,
}

pub struct BrowserFetcher {
    config: BrowserFetcherConfig,
    client: reqwest::Client,
}

impl BrowserFetcher {
    pub fn new(config: BrowserFetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.budget)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Automation(format!("http client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn export_url(id: &ResourceId) -> String {
        format!("{}&id={}", EXPORT_BASE_URL, id.as_str())
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(
        &self,
        id: &ResourceId,
        dest: &Path,
        events: &EventSender,
    ) -> Result<FetchedFile> {
        // One sandboxed session per call; no state crosses jobs.
        let session = BrowserSession::launch(&self.config.user_agent).await?;
        let result = self.drive(&session.browser, id, dest, events).await;
        session.close().await;
        result
    }
}

impl BrowserFetcher {
    async fn drive(
        &self,
        browser: &Browser,
        id: &ResourceId,
        dest: &Path,
        events: &EventSender,
    ) -> Result<FetchedFile> {
        let download_dir = self
            .config
            .download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("drivefetch-dl-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&download_dir)?;

        let result = self
            .drive_in_dir(browser, &download_dir, id, dest, events)
            .await;

        let _ = std::fs::remove_dir_all(&download_dir);
        result
    }

    async fn drive_in_dir(
        &self,
        browser: &Browser,
        download_dir: &Path,
        id: &ResourceId,
        dest: &Path,
        events: &EventSender,
    ) -> Result<FetchedFile> {
        let page = browser.new_page("about:blank").await.map_err(automation)?;

        // Listeners first: an attachment response fires DownloadWillBegin
        // during navigation and must not be missed.
        let will_begin = page
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(automation)?;
        let progress_events = page
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(automation)?;

        let (phase_tx, phase_rx) = watch::channel(DownloadPhase::Idle);
        let watcher = tokio::spawn(watch_downloads(will_begin, progress_events, phase_tx));

        browser
            .execute(
                SetDownloadBehaviorParams::builder()
                    .behavior(SetDownloadBehaviorBehavior::AllowAndName)
                    .download_path(download_dir.display().to_string())
                    .events_enabled(true)
                    .build()
                    .map_err(FetchError::Automation)?,
            )
            .await
            .map_err(automation)?;

        emit(events, "Opening share page", 0);
        let url = BrowserFetcher::export_url(id);

        // An attachment response aborts the navigation itself; that is the
        // download firing, not a failure.
        if let Err(err) = page.goto(url.clone()).await {
            debug!(error = %err, "navigation interrupted");
        }
        let _ = page.wait_for_navigation().await;

        // Rung 1: warning interstitial for large / unscanned files.
        if idle(&phase_rx) {
            self.click_download_anyway(&page).await;
        }

        // Rung 2: probe the known download affordances.
        if idle(&phase_rx) {
            self.probe_selectors(&page).await;
        }

        // Rung 3: bounded wait for the download to complete.
        let phase = self.await_download(&phase_rx, events).await;

        let outcome = match phase {
            DownloadPhase::Done {
                guid,
                suggested_name,
            } => {
                let staged = download_dir.join(&guid);
                let bytes = std::fs::metadata(&staged)?.len();
                replace_file(&staged, dest)?;
                info!(id = %id, bytes, "download event completed");
                emit(
                    events,
                    format!("Download received ({})", ByteSize(bytes)),
                    100,
                );
                Ok(FetchedFile {
                    path: dest.to_path_buf(),
                    bytes,
                    suggested_name,
                })
            }
            // Rung 4: budget exhausted with no completed event; issue the
            // export request directly.
            _ => self.direct_fetch(&url, id, dest, events).await,
        };

        watcher.abort();
        outcome
    }

    async fn click_download_anyway(&self, page: &Page) {
        if let Ok(element) = page.find_xpath(DOWNLOAD_ANYWAY_XPATH).await {
            debug!("clicking download-anyway control");
            if element.click().await.is_ok() {
                // give the listener a moment to fire
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    async fn probe_selectors(&self, page: &Page) {
        for selector in FALLBACK_SELECTORS {
            if let Ok(element) = page.find_element(*selector).await {
                debug!(selector, "clicking fallback selector");
                if element.click().await.is_ok() {
                    break;
                }
            }
        }
    }

    /// Sleep in fixed increments until the download completes or the budget
    /// runs out, emitting progress with percentage linear in elapsed time.
    async fn await_download(
        &self,
        phase_rx: &watch::Receiver<DownloadPhase>,
        events: &EventSender,
    ) -> DownloadPhase {
        let started = Instant::now();
        let mut last_emit = started;

        while started.elapsed() < self.config.budget {
            let phase = phase_rx.borrow().clone();
            if matches!(phase, DownloadPhase::Done { .. }) {
                return phase;
            }

            if last_emit.elapsed() >= self.config.progress_interval {
                last_emit = Instant::now();
                let fraction =
                    started.elapsed().as_secs_f64() / self.config.budget.as_secs_f64();
                let percentage = ((fraction * 100.0) as u8).min(99);
                emit(events, "Waiting for download to start", percentage);
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        phase_rx.borrow().clone()
    }

    async fn direct_fetch(
        &self,
        url: &str,
        id: &ResourceId,
        dest: &Path,
        events: &EventSender,
    ) -> Result<FetchedFile> {
        warn!(id = %id, "no download event fired, trying direct export request");
        emit(events, "Falling back to direct request", 99);

        let budget_secs = self.config.budget.as_secs();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| FetchError::Timeout(budget_secs))?;

        if !response.status().is_success() {
            return Err(FetchError::Timeout(budget_secs));
        }

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Automation(format!("reading export response: {e}")))?;
        tokio::fs::write(dest, &body).await?;

        let bytes = body.len() as u64;
        info!(id = %id, bytes, "direct export request succeeded");
        emit(
            events,
            format!("Download received ({})", ByteSize(bytes)),
            100,
        );

        Ok(FetchedFile {
            path: dest.to_path_buf(),
            bytes,
            suggested_name: None,
        })
    }
}

fn idle(phase_rx: &watch::Receiver<DownloadPhase>) -> bool {
    matches!(*phase_rx.borrow(), DownloadPhase::Idle)
}

fn automation(err: impl std::fmt::Display) -> FetchError {
    FetchError::Automation(err.to_string())
}

/// Fold the CDP download event streams into a single phase value. Runs until
/// the download reaches a terminal state or both streams close.
async fn watch_downloads<B, P>(mut will_begin: B, mut progress: P, phase: watch::Sender<DownloadPhase>)
where
    B: Stream<Item = Arc<EventDownloadWillBegin>> + Unpin + Send + 'static,
    P: Stream<Item = Arc<EventDownloadProgress>> + Unpin + Send + 'static,
{
    let mut suggested_name: Option<String> = None;

    loop {
        tokio::select! {
            event = will_begin.next() => {
                let Some(event) = event else { break };
                debug!(url = %event.url, "download began");
                suggested_name = Some(event.suggested_filename.clone());
                let _ = phase.send(DownloadPhase::Began {
                    suggested_name: suggested_name.clone(),
                });
            }
            event = progress.next() => {
                let Some(event) = event else { break };
                match event.state {
                    DownloadProgressState::Completed => {
                        let _ = phase.send(DownloadPhase::Done {
                            guid: event.guid.clone(),
                            suggested_name: suggested_name.clone(),
                        });
                        break;
                    }
                    DownloadProgressState::Canceled => {
                        let _ = phase.send(DownloadPhase::Canceled);
                        break;
                    }
                    DownloadProgressState::InProgress => {}
                }
            }
        }
    }
}

/// Launched browser plus the event-handler task that must be pumped for the
/// connection to make progress. Torn down on every exit path.
struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(user_agent: &str) -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg(format!("--user-agent={user_agent}"))
            .build()
            .map_err(FetchError::Automation)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(automation)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            debug!(error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver;

    #[test]
    fn export_url_embeds_id() {
        let id = resolver::resolve("https://drive.google.com/file/d/TestId_123-abc/view").unwrap();
        assert_eq!(
            BrowserFetcher::export_url(&id),
            "https://drive.google.com/uc?export=download&id=TestId_123-abc"
        );
    }

    #[test]
    fn config_defaults_match_budget() {
        let config = BrowserFetcherConfig::default();
        assert_eq!(config.budget, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.progress_interval, Duration::from_secs(5));
        assert!(config.download_dir.is_none());
    }
}
