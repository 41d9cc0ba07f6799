pub mod downloader;
pub mod fetcher;
pub mod parser;
pub mod pool;
pub mod processor;
pub mod retry;

pub use downloader::{DownloadReport, ImageDownloader};
pub use fetcher::{Fetcher, HttpFetcher};
pub use parser::MangaParser;
pub use processor::{ChapterProcessor, DiscoveryReport};

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::archive::{Archiver, cleanup_series};
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::models::Series;

/// Everything a finished run has to say
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub series: String,
    pub chapters: usize,
    pub discovery: DiscoveryReport,
    pub download: DownloadReport,
    pub archives: usize,
    pub removed_dirs: usize,
    pub cancelled: bool,
}

pub struct MangaCrawler {
    fetcher: Arc<dyn Fetcher>,
    config: FetchConfig,
    cancel: CancellationToken,
}

impl MangaCrawler {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config).map_err(Error::Client)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: FetchConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Token that stops both stages from taking new work once cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate `url`, fetch the detail page and plan the chapter list
    pub async fn fetch_series(&self, url: &str) -> Result<Series> {
        let mut series = Series::fetch(url, self.fetcher.as_ref(), &self.config.base_dir).await?;
        series.force = self.config.force;
        tracing::info!(
            manga = %series.display_name,
            chapters = series.chapters.len(),
            "chapter list ready"
        );
        Ok(series)
    }

    /// Discover, download, archive and clean up `series`.
    ///
    /// Chapter and page failures are logged and counted; only directory
    /// creation, archiving and cleanup errors end the run early.
    pub async fn run(&self, series: &mut Series) -> Result<RunSummary> {
        let mut summary = RunSummary {
            series: series.slug.clone(),
            chapters: series.chapters.len(),
            ..RunSummary::default()
        };

        series.materialize()?;

        let processor = ChapterProcessor::new(Arc::clone(&self.fetcher));
        summary.discovery = processor.discover_all(series, &self.config, &self.cancel).await;
        if summary.discovery.cancelled {
            summary.cancelled = true;
            return Ok(summary);
        }

        // every chapter's page list is final before the first page is queued
        let downloader = ImageDownloader::new(Arc::clone(&self.fetcher), self.config.retry.clone());
        summary.download = downloader.download_all(series, &self.config, &self.cancel).await;
        if summary.download.cancelled {
            summary.cancelled = true;
            return Ok(summary);
        }

        summary.archives = Archiver::archive_series(series, &self.config).await?;

        if !self.config.keep_dirs {
            summary.removed_dirs = cleanup_series(series)?;
        }

        Ok(summary)
    }

    /// `fetch_series` followed by `run`
    pub async fn crawl(&self, url: &str) -> Result<RunSummary> {
        let mut series = self.fetch_series(url).await?;
        self.run(&mut series).await
    }
}
