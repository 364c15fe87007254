//! Navigation-link extraction for devsite-style documentation pages.
//!
//! The extractor fetches one HTML page, walks the left-hand navigation menu
//! and emits `(title, url)` pairs in page-traversal order. Nested sub-items
//! are prefixed with their parent's title. Parsing is pure and testable
//! offline against HTML fixtures; only [`extract_links`] touches the
//! network.

use std::fmt;
use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Origin used to resolve relative hrefs in the navigation menu.
pub const DEFAULT_ORIGIN: &str = "https://cloud.google.com";

const NAV_SELECTOR: &str = "nav.devsite-nav";
const ITEM_SELECTOR: &str = "li.devsite-nav-item";
const SUB_ITEM_SELECTOR: &str = "li.devsite-nav-item-sub";
const TITLE_SELECTOR: &str = "a.devsite-nav-title";
const SUB_ITEM_CLASS: &str = "devsite-nav-item-sub";

/// One extracted navigation entry. Order of a sequence of records is
/// semantically significant; duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub title: String,
    pub url: String,
}

#[derive(Debug)]
pub enum ExtractError {
    Http(reqwest::Error),
    Status(reqwest::StatusCode),
    NavNotFound,
    Csv(csv::Error),
    Io(std::io::Error),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Http(e) => write!(f, "error fetching URL: {e}"),
            ExtractError::Status(s) => write!(f, "server returned status {s}"),
            ExtractError::NavNotFound => write!(f, "navigation pane not found"),
            ExtractError::Csv(e) => write!(f, "CSV error: {e}"),
            ExtractError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<reqwest::Error> for ExtractError {
    fn from(e: reqwest::Error) -> Self {
        ExtractError::Http(e)
    }
}

impl From<csv::Error> for ExtractError {
    fn from(e: csv::Error) -> Self {
        ExtractError::Csv(e)
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        ExtractError::Io(e)
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn anchor_text(anchor: &ElementRef<'_>) -> String {
    anchor.text().collect::<String>().trim().to_string()
}

fn resolve_href(href: &str, origin: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{}", origin.trim_end_matches('/'), href)
    }
}

/// Parse navigation links out of a fetched documentation page.
///
/// Top-level items yield their own title; each nested sub-item yields
/// `"{parent} - {child}"`. Records come back in document order.
pub fn parse_nav_links(html: &str, origin: &str) -> Result<Vec<LinkRecord>, ExtractError> {
    let document = Html::parse_document(html);
    let nav_sel = selector(NAV_SELECTOR);
    let item_sel = selector(ITEM_SELECTOR);
    let sub_sel = selector(SUB_ITEM_SELECTOR);
    let title_sel = selector(TITLE_SELECTOR);

    let nav = document
        .select(&nav_sel)
        .next()
        .ok_or(ExtractError::NavNotFound)?;

    let mut records = Vec::new();
    for item in nav.select(&item_sel) {
        // Sub-items also match the item selector; they are emitted under
        // their parent below.
        if item.value().classes().any(|class| class == SUB_ITEM_CLASS) {
            continue;
        }
        let Some(anchor) = item.select(&title_sel).next() else {
            continue;
        };
        let title = anchor_text(&anchor);
        let url = resolve_href(anchor.value().attr("href").unwrap_or(""), origin);
        records.push(LinkRecord {
            title: title.clone(),
            url,
        });

        for sub_item in item.select(&sub_sel) {
            if let Some(sub_anchor) = sub_item.select(&title_sel).next() {
                let sub_title = anchor_text(&sub_anchor);
                let sub_url =
                    resolve_href(sub_anchor.value().attr("href").unwrap_or(""), origin);
                records.push(LinkRecord {
                    title: format!("{title} - {sub_title}"),
                    url: sub_url,
                });
            }
        }
    }
    Ok(records)
}

/// Fetch a documentation page and extract its navigation links.
pub async fn extract_links(
    page_url: &str,
    origin: &str,
) -> Result<Vec<LinkRecord>, ExtractError> {
    info!(url = %page_url, "Fetching documentation page");
    let client = reqwest::Client::new();
    let response = client.get(page_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        error!(url = %page_url, status = %status, "Documentation page fetch failed");
        return Err(ExtractError::Status(status));
    }
    let body = response.text().await?;
    let records = parse_nav_links(&body, origin)?;
    info!(url = %page_url, rows = records.len(), "Extracted navigation links");
    Ok(records)
}

/// Write records as CSV with the `Title,Link` header.
pub fn write_links_csv(path: &Path, records: &[LinkRecord]) -> Result<(), ExtractError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Title", "Link"])?;
    for record in records {
        writer.write_record([&record.title, &record.url])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = records.len(), "Wrote link CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAV_FIXTURE: &str = r#"
        <html><body>
        <nav class="devsite-nav">
          <ul>
            <li class="devsite-nav-item">
              <a class="devsite-nav-title" href="/gemini/docs/overview"><span>Overview</span></a>
            </li>
            <li class="devsite-nav-item devsite-nav-item-heading">
              <a class="devsite-nav-title" href="/gemini/docs/setup">Setup</a>
              <ul>
                <li class="devsite-nav-item devsite-nav-item-sub">
                  <a class="devsite-nav-title" href="/gemini/docs/setup/install">Install</a>
                </li>
                <li class="devsite-nav-item devsite-nav-item-sub">
                  <a class="devsite-nav-title" href="https://example.com/external">External</a>
                </li>
              </ul>
            </li>
          </ul>
        </nav>
        </body></html>
    "#;

    #[test]
    fn extracts_top_level_and_sub_items_in_order() {
        let records = parse_nav_links(NAV_FIXTURE, DEFAULT_ORIGIN).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].title, "Overview");
        assert_eq!(
            records[0].url,
            "https://cloud.google.com/gemini/docs/overview"
        );
        assert_eq!(records[1].title, "Setup");
        assert_eq!(records[2].title, "Setup - Install");
        assert_eq!(
            records[2].url,
            "https://cloud.google.com/gemini/docs/setup/install"
        );
        assert_eq!(records[3].title, "Setup - External");
    }

    #[test]
    fn absolute_hrefs_pass_through_unchanged() {
        let records = parse_nav_links(NAV_FIXTURE, DEFAULT_ORIGIN).unwrap();
        assert_eq!(records[3].url, "https://example.com/external");
    }

    #[test]
    fn missing_nav_pane_is_an_error() {
        let err = parse_nav_links("<html><body><p>no nav</p></body></html>", DEFAULT_ORIGIN)
            .unwrap_err();
        assert!(matches!(err, ExtractError::NavNotFound));
    }

    #[test]
    fn row_count_is_top_level_plus_sub_items() {
        let records = parse_nav_links(NAV_FIXTURE, DEFAULT_ORIGIN).unwrap();
        let top_level = 2;
        let sub_items = 2;
        assert_eq!(records.len(), top_level + sub_items);
    }

    #[test]
    fn writes_csv_with_title_link_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.csv");
        let records = vec![
            LinkRecord {
                title: "A".into(),
                url: "https://example.com/a".into(),
            },
            LinkRecord {
                title: "B".into(),
                url: "https://example.com/b".into(),
            },
        ];
        write_links_csv(&path, &records).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("Title,Link"));
        assert_eq!(lines.next(), Some("A,https://example.com/a"));
        assert_eq!(lines.next(), Some("B,https://example.com/b"));
    }
}
