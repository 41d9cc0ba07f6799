//! Site-specific URL shapes and extraction rules for mangahere.

use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const SITE_HOST: &str = "www.mangahere.co";

fn re_quoted_url() -> &'static BytesRegex {
    static R: OnceLock<BytesRegex> = OnceLock::new();
    R.get_or_init(|| BytesRegex::new(r#""(https?://[^"]+)""#).unwrap())
}

fn re_chapter() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"/c(\d+\.?\d*)/").unwrap())
}

fn re_image() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"src="(https?://[^"]+\.mhcdn\.net/store/manga[^"]+)""#).unwrap())
}

fn re_image_src() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^https?://[^/]+\.mhcdn\.net/store/manga").unwrap())
}

fn img_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("img[src]").unwrap())
}

/// A validated series address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesUrl {
    /// `http://www.mangahere.co/manga/<slug>/`
    pub base_url: String,
    pub slug: String,
    /// Chapter segment when the input pointed inside the series
    pub start_chapter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MangaParser;

impl MangaParser {
    pub fn new() -> Self {
        Self
    }

    /// Validate `url` against `<scheme>://www.mangahere.co/manga/<slug>[/<chapter>/...]`
    pub fn parse_series_url(&self, url: &str) -> Result<SeriesUrl> {
        let parts: Vec<&str> = url.trim().trim_matches('/').split('/').collect();
        if parts.len() < 5 || parts[2] != SITE_HOST {
            return Err(Error::InvalidUrl(parts.join("/")));
        }
        if parts[3] != "manga" || parts[4].is_empty() {
            return Err(Error::NotAMangaUrl(parts[3].to_string()));
        }

        Ok(SeriesUrl {
            base_url: format!("{}/", parts[..5].join("/")),
            slug: parts[4].to_string(),
            start_chapter: parts.get(5).filter(|c| !c.is_empty()).map(|c| c.to_string()),
        })
    }

    /// Every quoted absolute URL in `html` that contains `base`, in document order
    pub fn extract_links(&self, html: &[u8], base: &str) -> Vec<String> {
        re_quoted_url()
            .captures_iter(html)
            .filter_map(|c| c.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .filter(|u| u.contains(base))
            .collect()
    }

    pub fn is_chapter_url(&self, url: &str) -> bool {
        re_chapter().is_match(url)
    }

    /// The `17.5` in `.../c17.5/...`
    pub fn chapter_number(&self, url: &str) -> Option<String> {
        re_chapter()
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|n| !n.is_empty())
    }

    /// Page links on a chapter's first page, deduplicated in first-seen order
    pub fn page_urls(&self, html: &[u8], chapter_url: &str) -> Vec<String> {
        let mut pages: Vec<String> = Vec::new();
        for url in self.extract_links(html, chapter_url) {
            if url.contains("html") && !pages.contains(&url) {
                pages.push(url);
            }
        }
        pages
    }

    /// The single CDN image a page displays
    pub fn image_url(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let from_img = document
            .select(img_selector())
            .filter_map(|img| img.value().attr("src"))
            .find(|src| re_image_src().is_match(src))
            .map(|src| src.to_string());

        // some layouts only carry the src inside inline script
        from_img.or_else(|| {
            re_image()
                .captures(html)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().replace("&amp;", "&"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_detail_url() {
        let parsed = MangaParser
            .parse_series_url("http://www.mangahere.co/manga/some_title/")
            .unwrap();
        assert_eq!(parsed.base_url, "http://www.mangahere.co/manga/some_title/");
        assert_eq!(parsed.slug, "some_title");
        assert_eq!(parsed.start_chapter, None);
    }

    #[test]
    fn keeps_chapter_segment_for_resume() {
        let parsed = MangaParser
            .parse_series_url("http://www.mangahere.co/manga/some_title/c012/3.html")
            .unwrap();
        assert_eq!(parsed.base_url, "http://www.mangahere.co/manga/some_title/");
        assert_eq!(parsed.start_chapter.as_deref(), Some("c012"));
    }

    #[test]
    fn rejects_foreign_host_and_short_paths() {
        assert!(matches!(
            MangaParser.parse_series_url("http://example.com/manga/some_title/"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            MangaParser.parse_series_url("http://www.mangahere.co/manga"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            MangaParser.parse_series_url("http://www.mangahere.co/news/some_title/"),
            Err(Error::NotAMangaUrl(_))
        ));
    }

    #[test]
    fn extracts_only_links_under_base() {
        let html = br#"<a href="http://www.mangahere.co/manga/t/c001/">1</a>
            <a href="http://other.site/manga/t/c001/">x</a>
            <a href='http://www.mangahere.co/manga/t/c002/'>single quotes ignored</a>"#;
        let links = MangaParser.extract_links(html, "http://www.mangahere.co/manga/t/");
        assert_eq!(links, vec!["http://www.mangahere.co/manga/t/c001/"]);
    }

    #[test]
    fn chapter_numbers_may_be_fractional() {
        let p = MangaParser;
        assert_eq!(p.chapter_number("http://h/manga/t/c017.5/").as_deref(), Some("017.5"));
        assert_eq!(p.chapter_number("http://h/manga/t/c003/").as_deref(), Some("003"));
        assert_eq!(p.chapter_number("http://h/manga/t/extra/"), None);
        assert!(!p.is_chapter_url("http://h/manga/t/"));
    }

    #[test]
    fn page_urls_are_unique_and_need_html() {
        let base = "http://www.mangahere.co/manga/t/c001/";
        let html = format!(
            r#""{base}" "{base}2.html" "{base}3.html" "{base}2.html" "{base}feed.rss""#
        );
        let pages = MangaParser.page_urls(html.as_bytes(), base);
        assert_eq!(pages, vec![format!("{base}2.html"), format!("{base}3.html")]);
    }

    #[test]
    fn image_lookup_repeats_across_pages() {
        for n in 1..=3 {
            let html = format!(r#"<img src="http://z.mhcdn.net/store/manga/1/c001/{n:03}.jpg">"#);
            let expected = format!("http://z.mhcdn.net/store/manga/1/c001/{n:03}.jpg");
            assert_eq!(MangaParser.image_url(&html), Some(expected));
        }
    }

    #[test]
    fn finds_cdn_image_in_img_tag() {
        let html = r#"<html><body>
            <img src="http://www.mangahere.co/media/logo.png">
            <img id="image" src="http://z.mhcdn.net/store/manga/1/01-001.0/compressed/a001.jpg?v=12" />
            </body></html>"#;
        assert_eq!(
            MangaParser.image_url(html).as_deref(),
            Some("http://z.mhcdn.net/store/manga/1/01-001.0/compressed/a001.jpg?v=12")
        );
    }

    #[test]
    fn falls_back_to_raw_src_attribute() {
        let html = r#"<script>var s = 'src="http://a.mhcdn.net/store/manga/9/p.png"';</script>"#;
        assert_eq!(
            MangaParser.image_url(html).as_deref(),
            Some("http://a.mhcdn.net/store/manga/9/p.png")
        );
        assert_eq!(MangaParser.image_url("<img src=\"http://x/y.jpg\">"), None);
    }
}
