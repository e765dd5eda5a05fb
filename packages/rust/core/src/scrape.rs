//! Scrape-and-extract loop over the selected URLs.
//!
//! URLs are crawled one after another. A failed URL is reported and the loop
//! moves on; nothing is retried.

use serde::Serialize;
use tracing::{info, instrument, warn};

use interior_crawler::PageCrawler;
use interior_shared::{ProductInfo, Result};
use interior_storage::{NewPage, PageStatus, RunStats, Storage};

use crate::extraction::{ExtractionOutcome, LlmExtractor};
use crate::session::DataSource;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one URL.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UrlOutcome {
    Failed {
        url: String,
        status_code: Option<u16>,
        message: String,
        fetched_at: String,
    },
    Scraped {
        url: String,
        status_code: Option<u16>,
        title: Option<String>,
        markdown: String,
        fetched_at: String,
        extraction: Option<ExtractionOutcome>,
        /// Set when extraction ran and no chunk succeeded.
        extraction_error: Option<String>,
    },
}

impl UrlOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Failed { url, .. } | Self::Scraped { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Scraped { .. })
    }

    /// `Failed to scrape ...` line for a failed URL.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::Failed {
                url,
                status_code,
                message,
                ..
            } => {
                let code = status_code.map_or_else(|| "None".to_string(), |c| c.to_string());
                Some(format!(
                    "Failed to scrape {url}: status_code:{code} message:{message}"
                ))
            }
            Self::Scraped { .. } => None,
        }
    }
}

/// Result of one scrape action.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeReport {
    pub outcomes: Vec<UrlOutcome>,
}

impl ScrapeReport {
    /// Markdown of every scraped page, each followed by a blank line.
    pub fn combined_markdown(&self) -> String {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                UrlOutcome::Scraped { markdown, .. } => Some(format!("{markdown}\n\n")),
                UrlOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failure_messages(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(UrlOutcome::failure_message)
            .collect()
    }

    pub fn scraped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.scraped_count()
    }

    /// Every extracted product, in URL order.
    pub fn products(&self) -> Vec<&ProductInfo> {
        self.extractions()
            .flat_map(|(_, extraction)| extraction.items.iter())
            .collect()
    }

    /// Total (input, output) tokens spent on extraction.
    pub fn token_usage(&self) -> (u64, u64) {
        self.extractions().fold((0, 0), |(i, o), (_, e)| {
            (i + e.tokens_in, o + e.tokens_out)
        })
    }

    fn extractions(&self) -> impl Iterator<Item = (&str, &ExtractionOutcome)> {
        self.outcomes.iter().filter_map(|o| match o {
            UrlOutcome::Scraped {
                url,
                extraction: Some(extraction),
                ..
            } => Some((url.as_str(), extraction)),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for the scrape loop.
pub trait ScrapeProgress: Send + Sync {
    /// Called before URL `index` (0-based) of `total` is crawled.
    fn url_started(&self, url: &str, index: usize, total: usize);
    /// Called after URL `index` has an outcome.
    fn url_finished(&self, outcome: &UrlOutcome, index: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ScrapeProgress for SilentProgress {
    fn url_started(&self, _url: &str, _index: usize, _total: usize) {}
    fn url_finished(&self, _outcome: &UrlOutcome, _index: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Crawl each URL in order, extracting products when `extractor` is set.
#[instrument(skip_all, fields(urls = urls.len(), extract = extractor.is_some()))]
pub async fn scrape_urls(
    urls: &[String],
    crawler: &PageCrawler,
    extractor: Option<&LlmExtractor>,
    progress: &dyn ScrapeProgress,
) -> ScrapeReport {
    let total = urls.len();
    let mut report = ScrapeReport::default();

    for (index, url) in urls.iter().enumerate() {
        progress.url_started(url, index, total);
        let page = crawler.crawl(url).await;

        let outcome = if !page.success {
            let message = page.error_message.unwrap_or_default();
            warn!(%url, status_code = ?page.status_code, %message, "scrape failed");
            UrlOutcome::Failed {
                url: url.clone(),
                status_code: page.status_code,
                message,
                fetched_at: page.fetched_at,
            }
        } else {
            let extraction = match extractor {
                Some(extractor) => Some(extractor.extract(url, &page.markdown).await),
                None => None,
            };
            let extraction_error = extraction
                .as_ref()
                .filter(|e| e.all_failed())
                .map(|e| {
                    e.errors
                        .iter()
                        .map(|c| c.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                });

            UrlOutcome::Scraped {
                url: url.clone(),
                status_code: page.status_code,
                title: page.title,
                markdown: page.markdown,
                fetched_at: page.fetched_at,
                extraction,
                extraction_error,
            }
        };

        progress.url_finished(&outcome, index, total);
        report.outcomes.push(outcome);
    }

    info!(
        scraped = report.scraped_count(),
        failed = report.failed_count(),
        "scrape finished"
    );
    report
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// IDs and counts written by [`save_report`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedRun {
    pub run_id: String,
    pub pages: usize,
    pub products: usize,
}

impl DataSource {
    fn storage_key(self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Page => "page",
        }
    }
}

/// Persist a scrape report as one run. Either the whole run is stored or
/// nothing is.
#[instrument(skip_all, fields(source = source.storage_key()))]
pub async fn save_report(
    storage: &Storage,
    report: &ScrapeReport,
    source: DataSource,
    source_url: Option<&str>,
) -> Result<SavedRun> {
    storage.begin().await?;
    let written = match write_report(storage, report, source, source_url).await {
        Ok(saved) => storage.commit().await.map(|()| saved),
        Err(e) => Err(e),
    };
    let saved = match written {
        Ok(saved) => saved,
        Err(e) => {
            if let Err(rollback) = storage.rollback().await {
                warn!(error = %rollback, "rollback after failed save");
            }
            return Err(e);
        }
    };

    info!(run_id = %saved.run_id, pages = saved.pages, products = saved.products, "scrape saved");
    Ok(saved)
}

async fn write_report(
    storage: &Storage,
    report: &ScrapeReport,
    source: DataSource,
    source_url: Option<&str>,
) -> Result<SavedRun> {
    let run_id = storage
        .insert_run(source.storage_key(), source_url, report.outcomes.len())
        .await?;
    let mut stats = RunStats::default();

    for outcome in &report.outcomes {
        match outcome {
            UrlOutcome::Failed {
                url,
                status_code,
                message,
                fetched_at,
            } => {
                storage
                    .insert_page(
                        &run_id,
                        &NewPage {
                            url,
                            status: PageStatus::Failed,
                            status_code: *status_code,
                            title: None,
                            markdown: None,
                            error_message: Some(message.as_str()),
                            fetched_at,
                            tokens_in: None,
                            tokens_out: None,
                        },
                    )
                    .await?;
                stats.failed += 1;
            }
            UrlOutcome::Scraped {
                url,
                status_code,
                title,
                markdown,
                fetched_at,
                extraction,
                extraction_error,
            } => {
                let page_id = storage
                    .insert_page(
                        &run_id,
                        &NewPage {
                            url,
                            status: PageStatus::Scraped,
                            status_code: *status_code,
                            title: title.as_deref(),
                            markdown: Some(markdown.as_str()),
                            error_message: extraction_error.as_deref(),
                            fetched_at,
                            tokens_in: extraction.as_ref().map(|e| e.tokens_in),
                            tokens_out: extraction.as_ref().map(|e| e.tokens_out),
                        },
                    )
                    .await?;
                stats.scraped += 1;

                for product in extraction.iter().flat_map(|e| e.items.iter()) {
                    storage.insert_product(&run_id, &page_id, url, product).await?;
                    stats.products += 1;
                }
            }
        }
    }

    let (tokens_in, tokens_out) = report.token_usage();
    stats.tokens_in = tokens_in;
    stats.tokens_out = tokens_out;
    storage.finish_run(&run_id, &stats).await?;

    Ok(SavedRun {
        run_id,
        pages: report.outcomes.len(),
        products: stats.products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Completion, ExtractionBackend};
    use async_trait::async_trait;
    use interior_crawler::CrawlOptions;
    use interior_shared::GeminiConfig;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedBackend(&'static str);

    #[async_trait]
    impl ExtractionBackend for FixedBackend {
        async fn generate(&self, _prompt: &str) -> Result<Completion> {
            Ok(Completion {
                text: self.0.to_string(),
                tokens_in: 50,
                tokens_out: 10,
                model: "fixed".into(),
                latency_ms: 0,
            })
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ScrapeProgress for RecordingProgress {
        fn url_started(&self, url: &str, index: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {index}/{total} {url}"));
        }
        fn url_finished(&self, outcome: &UrlOutcome, index: usize, _total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {index} {}", outcome.is_success()));
        }
    }

    const PRODUCT_JSON: &str = r#"{"brand_name":"Work Plus","item_name":"PENTE 1P SOFA","size":"W760 D760 H670 SH425","weight":"","material":"Fabric, Steel","price":"￥120,000","description":"Lounge sofa","image_urls":[]}"#;

    fn test_crawler() -> PageCrawler {
        PageCrawler::new(CrawlOptions {
            allow_private_hosts: true,
            random_user_agent: false,
            ..CrawlOptions::default()
        })
        .unwrap()
    }

    fn page_fixture() -> String {
        std::fs::read_to_string("../../../fixtures/pages/pente-1p-sofa.html")
            .expect("read page fixture")
    }

    async fn mock_site() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product/12426/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(page_fixture()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/product/404/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn urls(server: &MockServer, paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| format!("{}{p}", server.uri())).collect()
    }

    #[tokio::test]
    async fn failures_are_reported_and_loop_continues() {
        let server = mock_site().await;
        let urls = urls(&server, &["/product/404/", "/product/12426/"]);
        let progress = RecordingProgress::default();

        let report = scrape_urls(&urls, &test_crawler(), None, &progress).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.scraped_count(), 1);
        assert_eq!(
            report.failure_messages(),
            vec![format!(
                "Failed to scrape {}: status_code:404 message:HTTP 404 Not Found",
                urls[0]
            )]
        );
        assert_eq!(progress.events.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn combined_markdown_joins_pages_with_blank_line() {
        let server = mock_site().await;
        let urls = urls(&server, &["/product/12426/", "/product/404/", "/product/12426/"]);

        let report = scrape_urls(&urls, &test_crawler(), None, &SilentProgress).await;
        let combined = report.combined_markdown();

        assert!(combined.matches("PENTE 1P SOFA").count() >= 2);
        let pages: Vec<&str> = report
            .outcomes
            .iter()
            .filter_map(|o| match o {
                UrlOutcome::Scraped { markdown, .. } => Some(markdown.as_str()),
                UrlOutcome::Failed { .. } => None,
            })
            .collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(combined, format!("{}\n\n{}\n\n", pages[0], pages[1]));
    }

    fn scraped(url: &str, markdown: &str) -> UrlOutcome {
        UrlOutcome::Scraped {
            url: url.into(),
            status_code: Some(200),
            title: None,
            markdown: markdown.into(),
            fetched_at: "2025-04-01T00:00:00Z".into(),
            extraction: None,
            extraction_error: None,
        }
    }

    #[test]
    fn combined_markdown_skips_failed_urls() {
        let report = ScrapeReport {
            outcomes: vec![
                scraped("https://example.com/a", "# A"),
                UrlOutcome::Failed {
                    url: "https://example.com/b".into(),
                    status_code: Some(500),
                    message: "HTTP 500 Internal Server Error".into(),
                    fetched_at: String::new(),
                },
                scraped("https://example.com/c", "# C\nbody"),
            ],
        };
        assert_eq!(report.combined_markdown(), "# A\n\n# C\nbody\n\n");
        assert_eq!(ScrapeReport::default().combined_markdown(), "");
    }

    #[tokio::test]
    async fn extraction_runs_on_scraped_pages_only() {
        let server = mock_site().await;
        let urls = urls(&server, &["/product/12426/", "/product/404/"]);
        let extractor =
            LlmExtractor::new(Box::new(FixedBackend(PRODUCT_JSON)), &GeminiConfig::default());

        let report = scrape_urls(&urls, &test_crawler(), Some(&extractor), &SilentProgress).await;

        assert_eq!(report.products().len(), 1);
        assert_eq!(report.products()[0].item_name, "PENTE 1P SOFA");
        assert_eq!(report.token_usage(), (50, 10));
        assert!(matches!(
            &report.outcomes[0],
            UrlOutcome::Scraped { extraction_error: None, .. }
        ));
    }

    #[tokio::test]
    async fn unusable_extraction_sets_error() {
        let server = mock_site().await;
        let urls = urls(&server, &["/product/12426/"]);
        let extractor =
            LlmExtractor::new(Box::new(FixedBackend("no json here")), &GeminiConfig::default());

        let report = scrape_urls(&urls, &test_crawler(), Some(&extractor), &SilentProgress).await;
        let UrlOutcome::Scraped {
            extraction_error, ..
        } = &report.outcomes[0]
        else {
            panic!("page should be scraped");
        };
        assert!(extraction_error.as_deref().unwrap().contains("not JSON"));
        assert!(report.products().is_empty());
    }

    #[tokio::test]
    async fn save_report_writes_run_pages_and_products() {
        let server = mock_site().await;
        let urls = urls(&server, &["/product/12426/", "/product/404/"]);
        let extractor =
            LlmExtractor::new(Box::new(FixedBackend(PRODUCT_JSON)), &GeminiConfig::default());
        let report = scrape_urls(&urls, &test_crawler(), Some(&extractor), &SilentProgress).await;

        let db = std::env::temp_dir().join(format!("interior_core_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&db).await.unwrap();
        let saved = save_report(&storage, &report, DataSource::Page, Some(&urls[0]))
            .await
            .unwrap();

        assert_eq!(saved.pages, 2);
        assert_eq!(saved.products, 1);

        let runs = storage.list_runs().await.unwrap();
        assert_eq!(runs[0].data_source, "page");
        let pages = storage.list_pages(&saved.run_id).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().any(|p| p.status == PageStatus::Failed));

        let products = storage.list_products(None).await.unwrap();
        assert_eq!(products[0].product.brand_name, "Work Plus");
        assert_eq!(products[0].source_url, urls[0]);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_partial_run() {
        let db = std::env::temp_dir().join(format!("interior_core_{}.db", uuid::Uuid::now_v7()));
        let writer = Storage::open(&db).await.unwrap();
        let reader = Storage::open(&db).await.unwrap();

        // An open read transaction keeps the writer from committing.
        reader.begin().await.unwrap();
        assert!(reader.list_runs().await.unwrap().is_empty());

        let report = ScrapeReport {
            outcomes: vec![scraped("https://example.com/a", "# A")],
        };
        let result = save_report(&writer, &report, DataSource::Page, None).await;
        assert!(result.is_err());

        reader.commit().await.unwrap();
        assert!(writer.list_runs().await.unwrap().is_empty());

        let saved = save_report(&writer, &report, DataSource::Page, None)
            .await
            .unwrap();
        assert_eq!(writer.list_runs().await.unwrap()[0].id, saved.run_id);
    }

    #[test]
    fn failure_message_without_status() {
        let outcome = UrlOutcome::Failed {
            url: "https://example.com/x".into(),
            status_code: None,
            message: "connection refused".into(),
            fetched_at: String::new(),
        };
        assert_eq!(
            outcome.failure_message().unwrap(),
            "Failed to scrape https://example.com/x: status_code:None message:connection refused"
        );
    }
}
