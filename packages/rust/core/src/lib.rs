//! Domain logic for Interior.
//!
//! This crate ties the lower crates together into the two app areas:
//! furniture selection ([`conditions`], [`recommend`]) and product-data
//! scraping ([`urls`], [`scrape`], [`extraction`]). [`session`] holds the
//! state both areas share.

pub mod conditions;
pub mod extraction;
pub mod recommend;
pub mod scrape;
pub mod session;
pub mod urls;

pub use conditions::{
    ConditionDraft, ConditionError, ConditionRecord, ConditionSchema, ConditionTable,
    ConditionValue, TableError, validate,
};
pub use extraction::{
    ChunkError, Completion, ExtractionBackend, ExtractionOutcome, GeminiBackend, LlmExtractor,
    product_schema,
};
pub use recommend::{Recommendation, RecommendError, SampleRecommender};
pub use scrape::{
    SavedRun, ScrapeProgress, ScrapeReport, SilentProgress, UrlOutcome, save_report, scrape_urls,
};
pub use session::{DataSource, Session};
pub use urls::{UrlInputError, UrlRow, UrlTable, discover_page_links, discover_sitemap_urls};
