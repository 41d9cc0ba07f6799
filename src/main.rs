use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mangahere_fetch::{
    FetchConfig, MangaCrawler, RetryConfig, RunSummary, get_user_input, yes_no_prompt,
};

#[derive(Debug, Parser)]
#[command(name = "mangahere-fetch", version, about = "Download a MangaHere series into per-chapter zip files")]
struct Cli {
    /// Series URL, e.g. http://www.mangahere.co/manga/<name>/
    url: Option<String>,

    /// Do not remove (keep) the chapter directories
    #[arg(short, long)]
    keep_dirs: bool,

    /// Force downloading already downloaded chapters
    #[arg(short, long)]
    force: bool,

    /// Base directory for downloads
    #[arg(short, long, default_value = mangahere_fetch::config::DEFAULT_BASE_DIR)]
    output: PathBuf,

    /// Concurrent workers per stage
    #[arg(short, long, default_value_t = mangahere_fetch::config::DEFAULT_WORKERS)]
    workers: usize,

    /// Attempts per image before a page is abandoned
    #[arg(long, default_value_t = mangahere_fetch::config::DEFAULT_RETRY_LIMIT)]
    retries: u32,

    /// Start from the chapter in the URL without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> FetchConfig {
        FetchConfig {
            base_dir: self.output.clone(),
            workers: self.workers,
            force: self.force,
            keep_dirs: self.keep_dirs,
            show_progress: !self.json,
            retry: RetryConfig {
                max_attempts: self.retries,
                ..RetryConfig::default()
            },
            ..FetchConfig::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mangahere_fetch=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== {} ===", summary.series);
    println!("chapters:   {} total, {} skipped", summary.chapters, summary.discovery.skipped);
    println!(
        "discovery:  {} found, {} empty, {} failed",
        summary.discovery.populated, summary.discovery.empty, summary.discovery.failed
    );
    println!(
        "pages:      {}/{} downloaded, {} failed",
        summary.download.downloaded, summary.download.queued, summary.download.failed
    );
    println!("archives:   {}", summary.archives);
    println!("cleaned up: {}", summary.removed_dirs);
    if summary.cancelled {
        println!("(stopped early)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let url = match &cli.url {
        Some(url) => url.clone(),
        None => get_user_input().context("reading url")?,
    };
    if url.eq_ignore_ascii_case("exit") {
        return Ok(());
    }

    let crawler = MangaCrawler::new(cli.config())?;

    let cancel = crawler.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing tasks in flight");
            cancel.cancel();
        }
    });

    let mut series = crawler
        .fetch_series(&url)
        .await
        .context("Unable to make new series")?;
    tracing::info!(manga = %series.display_name, "manga name");

    if let (Some(index), Some(chapter)) = (series.resume_candidate, series.start_chapter.clone()) {
        let accepted = cli.yes || yes_no_prompt(&format!("Start from chapter {:?}?", chapter), true)?;
        if accepted {
            series.set_start_index(index);
        }
    }

    let summary = crawler.run(&mut series).await.context("Unable to finish run")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}
