use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::observability::Metrics;
use crate::pipeline::DownloadPipeline;
use crate::progress::ProgressTracker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<DownloadPipeline>,
    pub tracker: Arc<ProgressTracker>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let tracker = Arc::new(ProgressTracker::new(Duration::from_secs(
            config.progress.retain_terminal_secs,
        )));
        let metrics = Arc::new(Metrics::new());
        let pipeline = Arc::new(DownloadPipeline::new(
            fetcher,
            Arc::clone(&tracker),
            Arc::clone(&metrics),
            config.storage.models_root.clone(),
        ));

        Self {
            config: Arc::new(config),
            pipeline,
            tracker,
            metrics,
        }
    }
}
