//! Page download stage: page HTML -> image URL -> image bytes -> file.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::fetcher::Fetcher;
use super::parser::MangaParser;
use super::pool::{StageOptions, run_stage};
use super::retry::fetch_with_retry;
use crate::config::{FetchConfig, RetryConfig};
use crate::error::PageError;
use crate::models::{Image, Page, Series};
use crate::progress::ProgressTracker;

/// One page to fetch, with the directory its image belongs in
#[derive(Debug, Clone)]
pub struct PageTask {
    pub chapter: usize,
    pub chapter_name: String,
    pub directory: PathBuf,
    pub page: Page,
}

#[derive(Debug)]
pub struct PageOutcome {
    pub chapter: usize,
    pub page: Page,
    pub result: Result<PathBuf, PageError>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DownloadReport {
    pub queued: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Progress count when the stage finished
    pub completed: u64,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct ImageDownloader {
    fetcher: Arc<dyn Fetcher>,
    parser: MangaParser,
    retry: RetryConfig,
}

impl ImageDownloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, retry: RetryConfig) -> Self {
        Self {
            fetcher,
            parser: MangaParser::new(),
            retry,
        }
    }

    /// Download one page's image into its chapter directory.
    ///
    /// The page HTML is fetched once; the image is retried per the retry policy.
    pub async fn download_page(&self, task: PageTask, cancel: &CancellationToken) -> PageOutcome {
        let PageTask { chapter, chapter_name, directory, mut page } = task;
        let result = self.fetch_image(&mut page, cancel).await;
        let result = match result {
            Ok(()) => match page.image.as_mut() {
                Some(image) => image.save(&directory).await.map_err(|source| PageError::Write {
                    path: directory.join(&image.name),
                    source,
                }),
                None => Err(PageError::ImageNotFound(page.url.clone())),
            },
            Err(e) => Err(e),
        };

        match &result {
            Ok(path) => tracing::debug!(chapter = %chapter_name, path = %path.display(), "page saved"),
            Err(PageError::Cancelled) => {}
            Err(e) => tracing::error!(chapter = %chapter_name, page = %page.url, error = %e, "page abandoned"),
        }

        PageOutcome { chapter, page, result }
    }

    async fn fetch_image(&self, page: &mut Page, cancel: &CancellationToken) -> Result<(), PageError> {
        if cancel.is_cancelled() {
            return Err(PageError::Cancelled);
        }
        let html = self.fetcher.fetch(&page.url).await.map_err(PageError::PageFetch)?;
        let html = String::from_utf8_lossy(&html);
        let image_url = self
            .parser
            .image_url(&html)
            .ok_or_else(|| PageError::ImageNotFound(page.url.clone()))?;

        let mut image = Image::new(&image_url);
        let fetcher = Arc::clone(&self.fetcher);
        let data = fetch_with_retry(&self.retry, cancel, || {
            let fetcher = Arc::clone(&fetcher);
            let url = image_url.clone();
            async move { fetcher.fetch(&url).await }
        })
        .await?;
        image.attach(data);
        page.image = Some(image);
        Ok(())
    }

    /// Queue every page of every discovered chapter and wait for all of them
    pub async fn download_all(
        &self,
        series: &mut Series,
        config: &FetchConfig,
        cancel: &CancellationToken,
    ) -> DownloadReport {
        let start = series.start_index.min(series.chapters.len());
        let mut queue = Vec::new();
        for (index, chapter) in series.chapters.iter().enumerate().skip(start) {
            if !chapter.attempted || chapter.pages.is_empty() {
                continue;
            }
            for page in &chapter.pages {
                queue.push(PageTask {
                    chapter: index,
                    chapter_name: chapter.name.clone(),
                    directory: chapter.directory.clone(),
                    page: page.clone(),
                });
            }
        }

        let mut report = DownloadReport {
            queued: queue.len(),
            ..DownloadReport::default()
        };
        let tracker = ProgressTracker::start(
            "Page",
            queue.len() as u64,
            config.progress_interval,
            config.show_progress,
        );
        let this = self.clone();
        let worker_cancel = cancel.clone();
        let run = run_stage(
            StageOptions {
                name: "page",
                workers: config.workers(),
                queue_capacity: config.page_queue,
            },
            queue,
            tracker.counter(),
            cancel.clone(),
            move |task: PageTask| {
                let this = this.clone();
                let cancel = worker_cancel.clone();
                async move { this.download_page(task, &cancel).await }
            },
        )
        .await;
        report.completed = tracker.finish().await;
        report.cancelled = run.cancelled;

        for (_, outcome) in run.outputs {
            match outcome.result {
                Ok(_) => report.downloaded += 1,
                Err(_) => report.failed += 1,
            }
            let chapter = &mut series.chapters[outcome.chapter];
            if let Some(slot) = chapter.pages.iter_mut().find(|p| p.url == outcome.page.url) {
                *slot = outcome.page;
            }
        }

        tracing::info!(
            downloaded = report.downloaded,
            failed = report.failed,
            "finished downloading pages"
        );
        report
    }
}
