//! Application configuration for Interior.
//!
//! User config lives at `~/.interior/interior.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InteriorError, Result};
use crate::types::{FieldKind, FieldSpec, default_catalog_fields};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "interior.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".interior";

/// Default database file name inside the data directory.
const DB_FILE_NAME: &str = "interior.db";

// ---------------------------------------------------------------------------
// Config structs (matching interior.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini extraction settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Page crawl settings.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Furniture condition catalog.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Site map URL pre-filled in sitemap mode.
    #[serde(default = "default_sitemap_url")]
    pub sitemap_url: String,

    /// Page URL pre-filled in manual URL mode.
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// Directory holding the database and the TUI log.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum site-map index nesting followed during discovery.
    #[serde(default = "default_sitemap_depth")]
    pub sitemap_depth: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            sitemap_url: default_sitemap_url(),
            page_url: default_page_url(),
            data_dir: default_data_dir(),
            sitemap_depth: default_sitemap_depth(),
        }
    }
}

fn default_sitemap_url() -> String {
    "https://www.asplund-contract.com/product-sitemap.xml".into()
}
fn default_page_url() -> String {
    "https://www.asplund-contract.com/product/br/workplus/".into()
}
fn default_data_dir() -> String {
    "~/.interior".into()
}
fn default_sitemap_depth() -> u32 {
    2
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for product extraction.
    #[serde(default = "default_model")]
    pub model: String,

    /// REST endpoint root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_token_budget")]
    pub max_output_tokens: u32,

    /// Estimated input tokens per chunk.
    #[serde(default = "default_chunk_threshold")]
    pub chunk_token_threshold: usize,

    /// Fraction of each chunk repeated at the start of the next one.
    #[serde(default)]
    pub overlap_rate: f32,

    #[serde(default = "default_true")]
    pub apply_chunking: bool,

    /// Extraction instruction placed at the top of every prompt.
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: 0.0,
            max_output_tokens: default_token_budget(),
            chunk_token_threshold: default_chunk_threshold(),
            overlap_rate: 0.0,
            apply_chunking: true,
            instruction: default_instruction(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_TOKEN".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_token_budget() -> u32 {
    65536
}
fn default_chunk_threshold() -> usize {
    65536
}
fn default_true() -> bool {
    true
}

/// Instruction sent with every extraction chunk.
pub fn default_instruction() -> String {
    "Extract the furniture product information from the page content below. \
     Return only strict JSON that matches the given schema, with no commentary \
     and no Markdown fences. If the page lists several products, return a JSON \
     array with one object per product. Write sizes in millimetres (e.g. \
     W500 D500 H550 SH420), weights in kilograms, and prices in Japanese yen, \
     stating whether the price includes or excludes tax. Use an empty string \
     for any field the page does not mention and an empty list when there are \
     no product images."
        .into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Tags removed from the page before conversion.
    #[serde(default = "default_excluded_tags")]
    pub excluded_tags: Vec<String>,

    #[serde(default = "default_true")]
    pub exclude_external_links: bool,

    #[serde(default = "default_true")]
    pub exclude_social_media_links: bool,

    #[serde(default = "default_true")]
    pub exclude_external_images: bool,

    #[serde(default = "default_true")]
    pub remove_overlay_elements: bool,

    /// Pick a browser user agent per request.
    #[serde(default = "default_true")]
    pub random_user_agent: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Permit loopback/private addresses (local testing only).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            excluded_tags: default_excluded_tags(),
            exclude_external_links: true,
            exclude_social_media_links: true,
            exclude_external_images: true,
            remove_overlay_elements: true,
            random_user_agent: true,
            timeout_secs: default_timeout_secs(),
            allow_private_hosts: false,
        }
    }
}

fn default_excluded_tags() -> Vec<String> {
    vec!["header".into(), "footer".into(), "nav".into()]
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[catalog]` section: the condition form fields, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_fields")]
    pub fields: Vec<FieldSpec>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            fields: default_catalog_fields(),
        }
    }
}

impl CatalogConfig {
    /// Reject fields the condition form cannot render.
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            if let FieldKind::Range { min, max, step } = field.kind {
                if min > max {
                    return Err(InteriorError::config(format!(
                        "catalog field {}: range min {min} is greater than max {max}",
                        field.key
                    )));
                }
                if step <= 0 {
                    return Err(InteriorError::config(format!(
                        "catalog field {}: range step must be positive, got {step}",
                        field.key
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.interior/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| InteriorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.interior/interior.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| InteriorError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None if path == "~" => {
            dirs::home_dir().ok_or_else(|| InteriorError::config("could not determine home directory"))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Resolved data directory from `[defaults] data_dir`.
pub fn data_dir(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.defaults.data_dir)
}

/// Default database path (`<data_dir>/interior.db`).
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(data_dir(config)?.join(DB_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| InteriorError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| InteriorError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.catalog.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| InteriorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| InteriorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| InteriorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the env var named in config.
pub fn gemini_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(InteriorError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable."
        ))),
    }
}
