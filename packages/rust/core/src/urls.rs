//! URL tables for the scraping screen: discovery and row selection.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use interior_crawler::PageCrawler;
use interior_discovery::{DiscoveryOptions, discover_sitemap};
use interior_shared::{InteriorError, Result, SitemapEntry};

/// Problems with the URL typed into the analyze box.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlInputError {
    #[error("enter a URL to analyze")]
    EmptyUrl,

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<UrlInputError> for InteriorError {
    fn from(e: UrlInputError) -> Self {
        InteriorError::validation(e.to_string())
    }
}

/// Trim and parse user input as an absolute URL.
pub fn parse_input_url(input: &str) -> std::result::Result<Url, UrlInputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlInputError::EmptyUrl);
    }
    Url::parse(input).map_err(|e| UrlInputError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// One discovered URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRow {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
}

impl UrlRow {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            lastmod: None,
        }
    }
}

impl From<SitemapEntry> for UrlRow {
    fn from(entry: SitemapEntry) -> Self {
        Self {
            url: entry.loc,
            lastmod: entry.lastmod,
        }
    }
}

/// Ordered list of URLs shown in the table widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlTable {
    pub rows: Vec<UrlRow>,
}

impl UrlTable {
    pub fn new(rows: Vec<UrlRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.url.clone()).collect()
    }

    /// Rows at `indices`, in table order. Duplicates collapse and indices
    /// past the end are skipped.
    pub fn select(&self, indices: &[usize]) -> UrlTable {
        let wanted: BTreeSet<usize> = indices.iter().copied().collect();
        if let Some(max) = wanted.last().filter(|&&i| i >= self.rows.len()) {
            warn!(index = max, len = self.rows.len(), "ignoring selection past end of table");
        }

        let rows = wanted
            .into_iter()
            .filter_map(|i| self.rows.get(i).cloned())
            .collect();
        UrlTable { rows }
    }
}

impl From<Vec<SitemapEntry>> for UrlTable {
    fn from(entries: Vec<SitemapEntry>) -> Self {
        Self::new(entries.into_iter().map(UrlRow::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Build the URL table from the site map at `input`.
#[instrument(skip_all, fields(url = %input))]
pub async fn discover_sitemap_urls(input: &str, opts: &DiscoveryOptions) -> Result<UrlTable> {
    let url = parse_input_url(input)?;
    let entries = discover_sitemap(&url, opts).await?;
    info!(count = entries.len(), "site map discovered");
    Ok(UrlTable::from(entries))
}

/// Build the URL table from one page: the page itself, then the distinct
/// same-site links it contains.
#[instrument(skip_all, fields(url = %input))]
pub async fn discover_page_links(crawler: &PageCrawler, input: &str) -> Result<UrlTable> {
    let mut page_url = parse_input_url(input)?;
    page_url.set_fragment(None);

    let outcome = crawler.crawl(page_url.as_str()).await;
    if !outcome.success {
        let message = outcome.error_message.unwrap_or_default();
        return Err(InteriorError::Network(match outcome.status_code {
            Some(code) => format!("failed to analyze {page_url}: status_code:{code} message:{message}"),
            None => format!("failed to analyze {page_url}: {message}"),
        }));
    }

    let mut rows = vec![UrlRow::new(page_url.as_str())];
    for link in outcome.links.internal {
        if !rows.iter().any(|r| r.url == link) {
            rows.push(UrlRow::new(link));
        }
    }
    debug!(count = rows.len(), "page links collected");
    Ok(UrlTable::new(rows))
}
