//! Single-page web crawler.
//!
//! This crate provides:
//! - [`PageCrawler`]: fetches one URL and returns a [`CrawlOutcome`]
//! - [`sanitize`]: removal of excluded tags, overlays, off-site links and images
//! - [`user_agent`]: the browser user-agent pool used for requests

pub mod engine;
pub mod sanitize;
pub mod user_agent;

pub use engine::{CrawlOptions, CrawlOutcome, PageCrawler};
pub use sanitize::{PageLinks, SanitizeRules, SanitizedPage, same_site};
