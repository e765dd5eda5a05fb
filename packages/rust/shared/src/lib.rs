//! Shared types, error model, and configuration for Interior.
//!
//! This crate is the foundation depended on by all other Interior crates.
//! It provides:
//! - [`InteriorError`]: the unified error type
//! - Domain types ([`ProductInfo`], [`SitemapEntry`], the condition catalog)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, CrawlSettings, DefaultsConfig, GeminiConfig, config_dir,
    config_file_path, data_dir, database_path, default_instruction, expand_home, gemini_api_key,
    init_config, load_config, load_config_from,
};
pub use error::{InteriorError, Result};
pub use types::{
    ChoiceGroup, FieldKind, FieldSpec, ProductInfo, SitemapEntry, default_catalog_fields,
};
