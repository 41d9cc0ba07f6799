//! Chapter discovery stage: fill each chapter's page list from its first page.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::fetcher::Fetcher;
use super::parser::MangaParser;
use super::pool::{StageOptions, run_stage};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::{Chapter, Series};
use crate::progress::ProgressTracker;

/// How discovery ended for one chapter
#[derive(Debug)]
pub enum Discovery {
    Populated(usize),
    /// The first page linked to no pages; the chapter directory was removed
    Empty,
    Failed(FetchError),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DiscoveryReport {
    pub queued: usize,
    /// Already archived or downloaded by an earlier run
    pub skipped: usize,
    pub populated: usize,
    pub empty: usize,
    pub failed: usize,
    /// Progress count when the stage finished
    pub completed: u64,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct ChapterProcessor {
    fetcher: Arc<dyn Fetcher>,
    parser: MangaParser,
}

impl ChapterProcessor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            parser: MangaParser::new(),
        }
    }

    /// Fetch the chapter's first page and record every page it links to
    pub async fn discover(&self, mut chapter: Chapter) -> (Chapter, Discovery) {
        chapter.attempted = true;

        let html = match self.fetcher.fetch(&chapter.url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(chapter = %chapter.name, error = %e, "unable to download start page");
                return (chapter, Discovery::Failed(e));
            }
        };

        for url in self.parser.page_urls(&html, &chapter.url) {
            chapter.add_page(&url);
        }

        if chapter.pages.is_empty() {
            tracing::warn!(chapter = %chapter.name, "empty chapter");
            if let Err(e) = tokio::fs::remove_dir(&chapter.directory).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(
                        chapter = %chapter.name,
                        error = %e,
                        "error deleting empty chapter directory"
                    );
                }
            }
            return (chapter, Discovery::Empty);
        }

        tracing::debug!(chapter = %chapter.name, pages = chapter.pages.len(), "chapter discovered");
        let pages = chapter.pages.len();
        (chapter, Discovery::Populated(pages))
    }

    /// Run discovery over the series' active chapters.
    ///
    /// Chapters an earlier run already materialized are skipped unless the
    /// series is forced. Returns once every queued chapter has finished.
    pub async fn discover_all(
        &self,
        series: &mut Series,
        config: &FetchConfig,
        cancel: &CancellationToken,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let start = series.start_index.min(series.chapters.len());

        let mut queue = Vec::new();
        for (index, chapter) in series.chapters.iter().enumerate().skip(start) {
            if series.force || !chapter.is_materialized() {
                queue.push((index, chapter.clone()));
            } else {
                tracing::info!(chapter = %chapter.name, "already downloaded, skipping");
                report.skipped += 1;
            }
        }
        report.queued = queue.len();

        let tracker = ProgressTracker::start(
            "Chapter",
            queue.len() as u64,
            config.progress_interval,
            config.show_progress,
        );
        let this = self.clone();
        let run = run_stage(
            StageOptions {
                name: "chapter",
                workers: config.workers(),
                queue_capacity: config.chapter_queue,
            },
            queue,
            tracker.counter(),
            cancel.clone(),
            move |(index, chapter): (usize, Chapter)| {
                let this = this.clone();
                async move { (index, this.discover(chapter).await) }
            },
        )
        .await;
        report.completed = tracker.finish().await;
        report.cancelled = run.cancelled;

        for (_, (index, (chapter, outcome))) in run.outputs {
            match outcome {
                Discovery::Populated(_) => report.populated += 1,
                Discovery::Empty => report.empty += 1,
                Discovery::Failed(_) => report.failed += 1,
            }
            series.chapters[index] = chapter;
        }

        tracing::info!(
            populated = report.populated,
            empty = report.empty,
            failed = report.failed,
            skipped = report.skipped,
            "finished discovering chapters"
        );
        report
    }
}
