//! Single-page crawl engine.
//!
//! Fetches one URL, sanitizes the page, converts it to Markdown and reports
//! the outcome. Page failures are values, not errors: a caller looping over
//! many URLs inspects [`CrawlOutcome::success`] and moves on.

use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use tracing::{debug, info, instrument, warn};
use url::Url;

use interior_markdown::{ConvertOptions, convert};
use interior_shared::{CrawlSettings, InteriorError, Result};

use crate::sanitize::{PageLinks, SanitizeRules, sanitize};
use crate::user_agent::{DEFAULT_USER_AGENT, random_user_agent};

/// Maximum number of redirects followed per page.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime crawl options, usually built from the `[crawl]` config section.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Tags removed before conversion (in addition to script/style/noscript).
    pub excluded_tags: Vec<String>,
    pub exclude_external_links: bool,
    pub exclude_social_media_links: bool,
    pub exclude_external_images: bool,
    pub remove_overlay_elements: bool,
    /// Send a random browser user agent with each request.
    pub random_user_agent: bool,
    pub timeout_secs: u64,
    /// Allow loopback/private addresses (integration tests with mock servers).
    pub allow_private_hosts: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&CrawlSettings::default())
    }
}

impl From<&CrawlSettings> for CrawlOptions {
    fn from(settings: &CrawlSettings) -> Self {
        Self {
            excluded_tags: settings
                .excluded_tags
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            exclude_external_links: settings.exclude_external_links,
            exclude_social_media_links: settings.exclude_social_media_links,
            exclude_external_images: settings.exclude_external_images,
            remove_overlay_elements: settings.remove_overlay_elements,
            random_user_agent: settings.random_user_agent,
            timeout_secs: settings.timeout_secs,
            allow_private_hosts: settings.allow_private_hosts,
        }
    }
}

impl CrawlOptions {
    fn sanitize_rules(&self) -> SanitizeRules {
        SanitizeRules {
            excluded_tags: self.excluded_tags.clone(),
            remove_overlay_elements: self.remove_overlay_elements,
            exclude_external_links: self.exclude_external_links,
            exclude_social_media_links: self.exclude_social_media_links,
            exclude_external_images: self.exclude_external_images,
        }
    }
}

// ---------------------------------------------------------------------------
// CrawlOutcome
// ---------------------------------------------------------------------------

/// Result of crawling a single URL.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// The URL as requested.
    pub url: String,
    pub success: bool,
    /// HTTP status, when a response was received.
    pub status_code: Option<u16>,
    /// Why the crawl failed (`None` on success).
    pub error_message: Option<String>,
    /// Page Markdown with frontmatter (empty on failure).
    pub markdown: String,
    pub title: Option<String>,
    pub links: PageLinks,
    /// Absolute image URLs kept in the page.
    pub images: Vec<String>,
    /// RFC 3339 fetch time.
    pub fetched_at: String,
}

impl CrawlOutcome {
    fn failed(url: &str, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            status_code,
            error_message: Some(message.into()),
            markdown: String::new(),
            title: None,
            links: PageLinks::default(),
            images: Vec::new(),
            fetched_at: Utc::now().to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// PageCrawler
// ---------------------------------------------------------------------------

/// Fetches and converts individual pages.
pub struct PageCrawler {
    options: CrawlOptions,
    client: Client,
}

impl PageCrawler {
    /// Create a crawler with the given options.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| InteriorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { options, client })
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Crawl a single URL. Never fails; see [`CrawlOutcome::success`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn crawl(&self, url: &str) -> CrawlOutcome {
        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "invalid URL");
                return CrawlOutcome::failed(url, None, format!("invalid URL: {e}"));
            }
        };

        if !self.options.allow_private_hosts && is_ssrf_target(&parsed) {
            warn!("SSRF protection: blocked");
            return CrawlOutcome::failed(url, None, "blocked: not a public http(s) address");
        }

        let user_agent = if self.options.random_user_agent {
            random_user_agent()
        } else {
            DEFAULT_USER_AGENT
        };
        debug!(%user_agent, "fetching page");

        let response = match self
            .client
            .get(parsed.as_str())
            .header(USER_AGENT, user_agent)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed");
                return CrawlOutcome::failed(url, None, e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "non-success status");
            return CrawlOutcome::failed(url, Some(status.as_u16()), format!("HTTP {status}"));
        }

        let final_url = response.url().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return CrawlOutcome::failed(
                    url,
                    Some(status.as_u16()),
                    format!("body read failed: {e}"),
                );
            }
        };

        let fetched_at = Utc::now().to_rfc3339();
        let page = sanitize(&body, &final_url, &self.options.sanitize_rules());

        let converted = match convert(
            &page.html,
            &ConvertOptions {
                source_url: final_url.to_string(),
                title: None,
                fetched_at: Some(fetched_at.clone()),
            },
        ) {
            Ok(converted) => converted,
            Err(e) => {
                warn!(error = %e, "conversion failed");
                return CrawlOutcome::failed(url, Some(status.as_u16()), e.to_string());
            }
        };

        info!(
            status = status.as_u16(),
            title = %converted.title,
            words = converted.word_count,
            internal_links = page.links.internal.len(),
            images = page.images.len(),
            "page crawled"
        );

        CrawlOutcome {
            url: url.to_string(),
            success: true,
            status_code: Some(status.as_u16()),
            error_message: None,
            markdown: converted.markdown,
            title: Some(converted.title),
            links: page.links,
            images: page.images,
            fetched_at,
        }
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
