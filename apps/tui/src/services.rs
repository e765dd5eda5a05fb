//! Long-lived handles the screens call into.

use color_eyre::eyre::Result;
use tokio::runtime::Runtime;

use interior_core::LlmExtractor;
use interior_crawler::{CrawlOptions, PageCrawler};
use interior_discovery::DiscoveryOptions;
use interior_shared::AppConfig;

/// Config, async runtime and HTTP clients shared by every screen.
///
/// Network actions run with [`Runtime::block_on`]; the UI waits for them.
pub(crate) struct Services {
    pub config: AppConfig,
    pub runtime: Runtime,
    pub crawler: PageCrawler,
}

impl Services {
    pub(crate) fn new(config: AppConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let crawler = PageCrawler::new(CrawlOptions::from(&config.crawl))?;
        Ok(Self {
            config,
            runtime,
            crawler,
        })
    }

    pub(crate) fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            timeout_secs: self.config.crawl.timeout_secs,
            max_depth: self.config.defaults.sitemap_depth,
        }
    }

    /// Gemini extractor, or the reason it cannot be built.
    pub(crate) fn extractor(&self) -> interior_shared::Result<LlmExtractor> {
        LlmExtractor::gemini(&self.config)
    }
}
