use bytes::Bytes;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::MangaParser;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub url: String,
    pub name: String, // file name on disk, query string stripped
    #[serde(skip)]
    pub data: Option<Bytes>,
}

impl Image {
    pub fn new(url: &str) -> Self {
        let without_query = url.split(['?', '#']).next().unwrap_or(url);
        let name = without_query
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("image")
            .to_string();

        Self {
            url: url.to_string(),
            name,
            data: None,
        }
    }

    pub fn attach(&mut self, data: Bytes) {
        self.data = Some(data);
    }

    /// Write the payload into `directory` and drop it from memory
    pub async fn save(&mut self, directory: &Path) -> io::Result<PathBuf> {
        let data = match self.data.take() {
            Some(d) if !d.is_empty() => d,
            _ => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "no data to write to file"));
            }
        };
        let path = directory.join(&self.name);
        tokio::fs::write(&path, &data).await?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub url: String,
    pub image: Option<Image>,
}

impl Page {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub number: Option<f32>,
    pub name: String,
    pub directory: PathBuf,
    pub url: String,
    pub pages: Vec<Page>,
    /// Set once the discovery stage has looked at this chapter
    pub attempted: bool,
}

impl Chapter {
    pub fn new(url: &str, name: &str, number: Option<f32>, directory: PathBuf) -> Self {
        Self {
            number,
            name: name.to_string(),
            directory,
            url: url.to_string(),
            pages: Vec::new(),
            attempted: false,
        }
    }

    /// Append a page unless one with the same URL is already present
    pub fn add_page(&mut self, url: &str) -> bool {
        if self.pages.iter().any(|p| p.url == url) {
            return false;
        }
        self.pages.push(Page::new(url));
        true
    }

    /// `<series dir>/<name>.zip`, next to the chapter directory
    pub fn archive_path(&self) -> PathBuf {
        let file = format!("{}.zip", self.name);
        match self.directory.parent() {
            Some(parent) => parent.join(file),
            None => PathBuf::from(file),
        }
    }

    pub fn create_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory).map_err(|source| Error::CreateDir {
            path: self.directory.clone(),
            source,
        })
    }

    /// Has a previous run left an archive or any files for this chapter?
    pub fn is_materialized(&self) -> bool {
        if self.archive_path().exists() {
            return true;
        }
        std::fs::read_dir(&self.directory)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub slug: String,
    pub display_name: String,
    /// Detail page, `http://www.mangahere.co/manga/<slug>/`
    pub url: String,
    /// `<base dir>/<slug>`
    pub directory: PathBuf,
    pub chapters: Vec<Chapter>,
    pub start_index: usize,
    pub force: bool,
    /// Chapter the input URL pointed at, offered as a starting point
    pub resume_candidate: Option<usize>,
    pub start_chapter: Option<String>,
}

impl Series {
    /// Fetch the detail page and plan the chapter list from it
    pub async fn fetch(url: &str, fetcher: &dyn Fetcher, base_dir: &Path) -> Result<Self> {
        let parsed = MangaParser.parse_series_url(url)?;
        tracing::info!(manga = %parsed.slug, "fetching manga detail page");
        let listing = fetcher
            .fetch(&parsed.base_url)
            .await
            .map_err(Error::SeriesPage)?;
        Self::plan(url, &listing, base_dir)
    }

    /// Build the chapter list from the detail page HTML without touching disk.
    ///
    /// Chapter URLs are sorted as strings, so `c10` lands before `c2` when the
    /// site does not zero-pad its chapter numbers.
    pub fn plan(url: &str, listing_html: &[u8], base_dir: &Path) -> Result<Self> {
        let parser = MangaParser::new();
        let parsed = parser.parse_series_url(url)?;

        let mut chapter_urls: Vec<String> = parser
            .extract_links(listing_html, &parsed.base_url)
            .into_iter()
            .filter(|u| parser.is_chapter_url(u))
            .collect();
        chapter_urls.sort();
        chapter_urls.dedup();

        let directory = base_dir.join(&parsed.slug);
        let mut series = Series {
            display_name: prettify_name(&parsed.slug),
            slug: parsed.slug,
            url: parsed.base_url,
            directory,
            chapters: Vec::with_capacity(chapter_urls.len()),
            start_index: 0,
            force: false,
            resume_candidate: None,
            start_chapter: parsed.start_chapter,
        };

        for chapter_url in &chapter_urls {
            series.add_chapter(&parser, chapter_url);
        }

        if let Some(start) = &series.start_chapter {
            let wanted = format!("{}{}/", series.url, start);
            series.resume_candidate = series
                .chapters
                .iter()
                .position(|c| c.url == wanted)
                .filter(|&idx| idx > 0);
        }

        Ok(series)
    }

    fn add_chapter(&mut self, parser: &MangaParser, url: &str) {
        let number = parser.chapter_number(url);
        let name = chapter_name(number.as_deref(), self.chapters.len() + 1);
        let chapter = Chapter::new(
            url,
            &name,
            number.and_then(|n| n.parse().ok()),
            self.directory.join(&name),
        );
        self.chapters.push(chapter);
    }

    /// Create every chapter directory
    pub fn materialize(&self) -> Result<()> {
        for chapter in &self.chapters {
            chapter.create_dir()?;
        }
        Ok(())
    }

    pub fn set_start_index(&mut self, index: usize) {
        self.start_index = index.min(self.chapters.len());
    }

    /// Chapters from the start index on
    pub fn active_chapters(&self) -> &[Chapter] {
        &self.chapters[self.start_index.min(self.chapters.len())..]
    }
}

/// `c<number>`, or a zero-padded ordinal when the URL carries no number
pub fn chapter_name(number: Option<&str>, ordinal: usize) -> String {
    match number {
        Some(n) if !n.is_empty() => format!("c{}", n),
        _ => format!("c_{:03}", ordinal),
    }
}

fn prettify_name(slug: &str) -> String {
    slug.replace('_', " ").to_uppercase()
}
