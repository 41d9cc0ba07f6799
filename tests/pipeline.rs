use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mangahere_fetch::{FetchConfig, FetchError, Fetcher, MangaCrawler, RetryConfig};

const SERIES: &str = "http://www.mangahere.co/manga/demo_title/";
const RETRIES: u32 = 3;

/// Serves canned bodies and remembers every URL asked for
#[derive(Default)]
struct SiteFetcher {
    bodies: HashMap<String, Result<Vec<u8>, u16>>,
    hits: Mutex<Vec<String>>,
}

impl SiteFetcher {
    fn ok(&mut self, url: String, body: impl Into<Vec<u8>>) {
        self.bodies.insert(url, Ok(body.into()));
    }

    fn status(&mut self, url: String, status: u16) {
        self.bodies.insert(url, Err(status));
    }

    fn hits_for(&self, prefix: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|u| u.starts_with(prefix)).count()
    }

    fn reset(&self) {
        self.hits.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.hits.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(Ok(body)) => Ok(Bytes::from(body.clone())),
            Some(Err(status)) => Err(FetchError::Status { url: url.to_string(), status: *status }),
            None => Err(FetchError::Status { url: url.to_string(), status: 404 }),
        }
    }
}

fn image_url(chapter: &str, page: u32) -> String {
    format!("http://z.mhcdn.net/store/manga/9/{chapter}/{page:03}.jpg?v=1")
}

fn page_html(image: &str) -> String {
    format!(r#"<html><body><img id="image" src="{image}" /></body></html>"#)
}

/// c001 has two good pages, c002 links to no pages, c003's only image keeps
/// failing and c004's first page cannot be fetched
fn demo_site() -> SiteFetcher {
    let mut site = SiteFetcher::default();
    let listing: String = ["c003", "c004", "c001", "c002"]
        .iter()
        .map(|c| format!(r#"<a href="{SERIES}{c}/">{c}</a>"#))
        .collect();
    site.ok(SERIES.to_string(), format!("<html>{listing}</html>"));

    let c001 = format!("{SERIES}c001/");
    site.ok(
        c001.clone(),
        format!(r#"<select><option value="{c001}1.html"/><option value="{c001}2.html"/></select>"#),
    );
    for page in 1..=2 {
        let image = image_url("c001", page);
        site.ok(format!("{c001}{page}.html"), page_html(&image));
        site.ok(image, format!("image {page}"));
    }

    site.ok(format!("{SERIES}c002/"), "<html>nothing here</html>");

    let c003 = format!("{SERIES}c003/");
    site.ok(c003.clone(), format!(r#"<option value="{c003}1.html"/>"#));
    let broken = image_url("c003", 1);
    site.ok(format!("{c003}1.html"), page_html(&broken));
    site.status(broken, 503);

    site.status(format!("{SERIES}c004/"), 404);

    site
}

fn config(base: &Path) -> FetchConfig {
    FetchConfig {
        base_dir: base.to_path_buf(),
        workers: 3,
        show_progress: false,
        retry: RetryConfig::immediate(RETRIES),
        ..FetchConfig::default()
    }
}

fn zip_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn full_run_archives_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());
    let crawler = MangaCrawler::with_fetcher(config(tmp.path()), site.clone());

    let summary = crawler.crawl(SERIES).await.unwrap();
    let series_dir = tmp.path().join("demo_title");

    assert_eq!(summary.series, "demo_title");
    assert_eq!(summary.chapters, 4);
    assert!(!summary.cancelled);

    assert_eq!(summary.discovery.queued, 4);
    assert_eq!(summary.discovery.completed, 4);
    assert_eq!(summary.discovery.populated, 2);
    assert_eq!(summary.discovery.empty, 1);
    assert_eq!(summary.discovery.failed, 1);

    // empty and failed chapters contribute no pages
    assert_eq!(summary.download.queued, 3);
    assert_eq!(summary.download.completed, 3);
    assert_eq!(summary.download.downloaded, 2);
    assert_eq!(summary.download.failed, 1);

    assert_eq!(site.hits_for(&image_url("c003", 1)), RETRIES as usize);
    assert_eq!(site.hits_for(&format!("{SERIES}c003/1.html")), 1);
    assert_eq!(site.hits_for(&format!("{SERIES}c004/")), 1);

    assert_eq!(summary.archives, 1);
    assert_eq!(zip_entries(&series_dir.join("c001.zip")), vec!["001.jpg", "002.jpg"]);
    assert!(!series_dir.join("c002.zip").exists());
    assert!(!series_dir.join("c003.zip").exists());
    assert!(!series_dir.join("c004.zip").exists());

    assert_eq!(summary.removed_dirs, 3);
    for chapter in ["c001", "c002", "c003", "c004"] {
        assert!(!series_dir.join(chapter).exists(), "{chapter} should be gone");
    }
}

#[tokio::test]
async fn failed_chapter_is_counted_but_gets_no_pages() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());
    let keep = FetchConfig { keep_dirs: true, ..config(tmp.path()) };

    let summary = MangaCrawler::with_fetcher(keep, site.clone()).crawl(SERIES).await.unwrap();

    let failed_dir = tmp.path().join("demo_title").join("c004");
    assert_eq!(summary.discovery.failed, 1);
    assert_eq!(summary.discovery.completed, summary.discovery.queued as u64);
    assert_eq!(summary.download.queued, 3);
    assert_eq!(site.hits_for(&format!("{SERIES}c004/")), 1);
    // discovery failure leaves the directory for cleanup
    assert!(failed_dir.is_dir());
    assert_eq!(std::fs::read_dir(&failed_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn second_run_skips_archived_chapters() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());

    MangaCrawler::with_fetcher(config(tmp.path()), site.clone())
        .crawl(SERIES)
        .await
        .unwrap();
    site.reset();

    let summary = MangaCrawler::with_fetcher(config(tmp.path()), site.clone())
        .crawl(SERIES)
        .await
        .unwrap();

    assert_eq!(site.hits_for(&format!("{SERIES}c001/")), 0);
    assert_eq!(site.hits_for(&image_url("c001", 1)), 0);
    assert_eq!(summary.discovery.skipped, 1);
    assert_eq!(summary.discovery.queued, 3);
    assert_eq!(summary.download.downloaded, 0);
    assert_eq!(summary.archives, 0);
    assert!(tmp.path().join("demo_title").join("c001.zip").is_file());
}

#[tokio::test]
async fn force_fetches_archived_chapters_again() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());

    MangaCrawler::with_fetcher(config(tmp.path()), site.clone())
        .crawl(SERIES)
        .await
        .unwrap();
    site.reset();

    let forced = FetchConfig { force: true, ..config(tmp.path()) };
    let summary = MangaCrawler::with_fetcher(forced, site.clone())
        .crawl(SERIES)
        .await
        .unwrap();

    assert_eq!(summary.discovery.skipped, 0);
    assert_eq!(site.hits_for(&format!("{SERIES}c001/")), 3);
    assert_eq!(summary.download.downloaded, 2);
    assert_eq!(summary.archives, 1);
}

#[tokio::test]
async fn keep_dirs_leaves_downloaded_files() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());
    let keep = FetchConfig { keep_dirs: true, ..config(tmp.path()) };

    let summary = MangaCrawler::with_fetcher(keep, site).crawl(SERIES).await.unwrap();

    let series_dir = tmp.path().join("demo_title");
    assert_eq!(summary.removed_dirs, 0);
    assert_eq!(std::fs::read(series_dir.join("c001").join("001.jpg")).unwrap(), b"image 1");
    assert!(series_dir.join("c001.zip").is_file());
    // removed during discovery, not by cleanup
    assert!(!series_dir.join("c002").exists());
}

#[tokio::test]
async fn starting_chapter_limits_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let site = Arc::new(demo_site());
    let crawler = MangaCrawler::with_fetcher(config(tmp.path()), site.clone());

    let mut series = crawler.fetch_series(&format!("{SERIES}c002/1.html")).await.unwrap();
    let index = series.resume_candidate.unwrap();
    series.set_start_index(index);

    let summary = crawler.run(&mut series).await.unwrap();
    assert_eq!(summary.discovery.queued, 3);
    assert_eq!(site.hits_for(&format!("{SERIES}c001/")), 0);
    assert_eq!(summary.archives, 0);
}

#[tokio::test]
async fn missing_series_page_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let crawler = MangaCrawler::with_fetcher(config(tmp.path()), Arc::new(SiteFetcher::default()));

    let err = crawler.crawl(SERIES).await.unwrap_err();
    assert!(matches!(err, mangahere_fetch::Error::SeriesPage(_)));
    assert!(crawler.crawl("http://example.com/manga/x/").await.is_err());
}
