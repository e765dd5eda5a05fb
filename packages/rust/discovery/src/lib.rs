//! XML site-map discovery.
//!
//! Fetches a site map, follows `<sitemapindex>` documents to a bounded depth,
//! and returns the merged list of page entries. Gzip-compressed site maps
//! (`.xml.gz`) are decoded transparently.

mod sitemap;

use std::collections::{HashSet, VecDeque};
use std::io::Read;

use flate2::read::GzDecoder;
use interior_shared::{InteriorError, Result, SitemapEntry};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use sitemap::{ParsedSitemap, parse_sitemap};

/// Maximum number of redirects to follow when fetching a site map.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for fetching a site map.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of nested `<sitemapindex>` levels followed.
const DEFAULT_MAX_DEPTH: u32 = 2;

/// Maximum response size we consider valid (50 MB, the protocol limit).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("Interior/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for site-map discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// How many index levels below the root are followed.
    pub max_depth: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Fetch and parse the site map at `url`, merging any child site maps.
///
/// The root document must load and parse; a failing child site map is
/// logged and skipped. Entries are returned in document order with
/// duplicate `loc`s dropped.
#[instrument(skip_all, fields(url = %url))]
pub async fn discover_sitemap(url: &Url, opts: &DiscoveryOptions) -> Result<Vec<SitemapEntry>> {
    let client = build_client(opts)?;

    let mut entries = Vec::new();
    let mut seen_locs = HashSet::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([(url.to_string(), 0_u32)]);

    while let Some((sitemap_url, depth)) = queue.pop_front() {
        if !visited.insert(sitemap_url.clone()) {
            continue;
        }

        let parsed = match fetch_and_parse(&client, &sitemap_url).await {
            Ok(parsed) => parsed,
            Err(e) if depth == 0 => return Err(e),
            Err(e) => {
                warn!(sitemap = %sitemap_url, error = %e, "skipping child sitemap");
                continue;
            }
        };

        match parsed {
            ParsedSitemap::Urlset(found) => {
                let before = entries.len();
                for entry in found {
                    if seen_locs.insert(entry.loc.clone()) {
                        entries.push(entry);
                    }
                }
                debug!(sitemap = %sitemap_url, added = entries.len() - before, "urlset parsed");
            }
            ParsedSitemap::Index(children) => {
                if depth >= opts.max_depth {
                    warn!(
                        sitemap = %sitemap_url,
                        depth,
                        children = children.len(),
                        "sitemap index nested too deep, not following"
                    );
                    continue;
                }
                debug!(sitemap = %sitemap_url, children = children.len(), "sitemap index parsed");
                queue.extend(children.into_iter().map(|child| (child, depth + 1)));
            }
        }
    }

    info!(
        entries = entries.len(),
        sitemaps = visited.len(),
        "sitemap discovery complete"
    );

    Ok(entries)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| InteriorError::Network(format!("failed to build HTTP client: {e}")))
}

async fn fetch_and_parse(client: &Client, url: &str) -> Result<ParsedSitemap> {
    let xml = fetch_sitemap(client, url).await?;
    parse_sitemap(&xml).map_err(|e| InteriorError::parse(format!("{url}: {e}")))
}

/// Fetch a site-map body as text, decompressing gzip when needed.
async fn fetch_sitemap(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| InteriorError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(InteriorError::Network(format!("{url}: HTTP {status}")));
    }

    // Check content-length if available
    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(InteriorError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let gzip_header = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("gzip"));

    let bytes = response
        .bytes()
        .await
        .map_err(|e| InteriorError::Network(format!("{url}: failed to read body: {e}")))?;

    decode_body(url, &bytes, gzip_header || url.ends_with(".gz"))
}

/// Turn a response body into text, inflating gzip content.
///
/// The gzip magic bytes are checked as well as the hint, since servers often
/// send `.gz` site maps with a generic content type or already decoded.
fn decode_body(url: &str, bytes: &[u8], gzip_hint: bool) -> Result<String> {
    let is_gzip = bytes.starts_with(&[0x1f, 0x8b]);
    if gzip_hint && !is_gzip {
        debug!(%url, "gzip expected but body is plain, reading as text");
    }

    if is_gzip {
        inflate(url, bytes, MAX_RESPONSE_SIZE)
    } else {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Inflate a gzip body, refusing output larger than `limit` bytes.
fn inflate(url: &str, bytes: &[u8], limit: u64) -> Result<String> {
    let mut text = String::new();
    GzDecoder::new(bytes)
        .take(limit + 1)
        .read_to_string(&mut text)
        .map_err(|e| InteriorError::parse(format!("{url}: invalid gzip body: {e}")))?;
    if text.len() as u64 > limit {
        return Err(InteriorError::parse(format!(
            "{url}: decompressed body too large (max {limit} bytes)"
        )));
    }
    Ok(text)
}
